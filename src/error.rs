use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// The orchestrator sent a payload that does not deserialize.
    MalformedInput { what: &'static str, details: String },
    NetworkNotFound(String),
    /// Expected for most VMs; callers keep the original cloud-init data.
    NoSriovInterfaces,
    LinkQuery { link: String, details: String },
    ResolverQuery(String),
    UserData(String),
    Serialize { what: &'static str, details: String },
}

impl Error {
    pub fn is_no_sriov_interfaces(&self) -> bool {
        matches!(self, Self::NoSriovInterfaces)
    }

    pub fn is_malformed_input(&self) -> bool {
        matches!(self, Self::MalformedInput { .. })
    }

    pub(crate) fn link_query(link: &str, error: anyhow::Error) -> Self {
        Self::LinkQuery {
            link: link.into(),
            details: format!("{:#}", error),
        }
    }
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::MalformedInput { what, details } => {
                write!(f, "failed to unmarshal given {}: {}", what, details)
            }
            Self::NetworkNotFound(name) => write!(f, "failed to find network {}", name),
            Self::NoSriovInterfaces => write!(f, "no SR-IOV interfaces found"),
            Self::LinkQuery { link, details } => {
                write!(f, "failed to get SR-IOV network details for {}: {}", link, details)
            }
            Self::ResolverQuery(details) => {
                write!(f, "failed to get DNS servers from resolv.conf: {}", details)
            }
            Self::UserData(details) => write!(f, "unable to decode user data: {}", details),
            Self::Serialize { what, details } => {
                write!(f, "failed to marshal {}: {}", what, details)
            }
        }
    }
}
