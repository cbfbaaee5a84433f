const YOUTUBE_ID_LEN: usize = 11;
const ID_MARKERS: [&str; 6] = ["youtu.be/", "v/", "embed/", "watch?v=", "&v=", "u/"];

/// Where the id would begin if `marker` matched at `pos`.
/// `u/` only counts as `u/<word char>/`.
fn id_start(url: &str, marker: &str, pos: usize) -> Option<usize> {
    let after = pos + marker.len();
    if marker != "u/" {
        return Some(after);
    }
    match url.as_bytes().get(after..after + 2)? {
        [c, b'/'] if c.is_ascii_alphanumeric() || *c == b'_' => Some(after + 2),
        _ => None,
    }
}

/// Extracts the 11 character video id from the usual YouTube link shapes.
/// The right-most marker that matches wins.
pub fn youtube_id(url: &str) -> Option<&str> {
    let (_, start) = ID_MARKERS
        .iter()
        .flat_map(|marker| {
            url.match_indices(marker)
                .filter_map(move |(pos, _)| id_start(url, marker, pos).map(|start| (pos, start)))
        })
        .max_by_key(|(pos, _)| *pos)?;

    let id = url[start..].split(['#', '&', '?']).next().unwrap_or_default();
    (id.len() == YOUTUBE_ID_LEN).then_some(id)
}

pub fn thumbnail_url(url: &str) -> Option<String> {
    youtube_id(url).map(|id| format!("https://img.youtube.com/vi/{id}/hqdefault.jpg"))
}
