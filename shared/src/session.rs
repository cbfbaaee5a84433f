use serde::{Serialize, Deserialize};
use std::collections::HashSet;

/// Who is behind the current request, as asserted by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    pub anonymous: bool,
    pub email: Option<String>,
    pub display_name: Option<String>,
}

impl Identity {
    pub fn guest(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            anonymous: true,
            email: None,
            display_name: None,
        }
    }

    /// Display name, falling back to the email address.
    pub fn label(&self) -> Option<&str> {
        self.display_name.as_deref().or(self.email.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewerClass {
    Anonymous,
    Registered,
    Administrator,
}

impl ViewerClass {
    pub fn is_admin(self) -> bool {
        self == ViewerClass::Administrator
    }
}

/// Administrator uids, matched exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminSet(HashSet<String>);

impl AdminSet {
    pub fn new<I, S>(uids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(uids.into_iter().map(Into::into).collect())
    }

    /// Parses a comma separated list, ignoring blanks.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(',').map(str::trim).filter(|uid| !uid.is_empty()))
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.0.contains(uid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn classify(identity: &Identity, admins: &AdminSet) -> ViewerClass {
    if admins.contains(&identity.uid) {
        ViewerClass::Administrator
    } else if identity.anonymous {
        ViewerClass::Anonymous
    } else {
        ViewerClass::Registered
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitGate {
    Allowed,
    SignInRequired,
}

pub fn submission_gate(class: ViewerClass) -> SubmitGate {
    match class {
        ViewerClass::Registered | ViewerClass::Administrator => SubmitGate::Allowed,
        ViewerClass::Anonymous => SubmitGate::SignInRequired,
    }
}
