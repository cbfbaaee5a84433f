use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const GUEST_PREFIX: &str = "guest:";
const UNKNOWN_IP: &str = "0.0.0.0";

/// Network identity of a caller that presented no credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_fingerprint: String,
    pub ip: String,
}

impl UserInfo {
    pub fn from_parts(ip: impl Into<String>, user_agent: Option<&str>) -> Self {
        let ip = ip.into();
        Self {
            user_fingerprint: fingerprint(&ip, user_agent),
            ip,
        }
    }

    /// Stable uid for an anonymous guest session.
    pub fn guest_uid(&self) -> String {
        format!("{GUEST_PREFIX}{}", self.user_fingerprint)
    }
}

fn fingerprint(ip: &str, user_agent: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(b"|");
    hasher.update(user_agent.unwrap_or_default().as_bytes());
    URL_SAFE.encode(hasher.finalize())
}

/// Left-most address of a proxy chain such as `client, proxy1, proxy2`.
pub(crate) fn first_hop(forwarded: &str) -> Option<&str> {
    forwarded.split(',').next().map(str::trim).filter(|ip| !ip.is_empty())
}

#[cfg(feature = "backend")]
mod backend_impl {
    use rocket::request::{FromRequest, Outcome};
    use rocket::Request;

    use super::{first_hop, UserInfo, UNKNOWN_IP};

    #[rocket::async_trait]
    impl<'r> FromRequest<'r> for UserInfo {
        type Error = ();

        async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
            let headers = req.headers();
            let ip = headers
                .get_one("X-Real-IP")
                .map(str::trim)
                .or_else(|| headers.get_one("X-Forwarded-For").and_then(first_hop))
                .map(str::to_string)
                .or_else(|| req.client_ip().map(|ip| ip.to_string()))
                .unwrap_or_else(|| UNKNOWN_IP.to_string());

            Outcome::Success(UserInfo::from_parts(ip, headers.get_one("User-Agent")))
        }
    }
}

