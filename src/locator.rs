use std::fmt;
use std::str::FromStr;

use crate::error::CaskError;
use crate::identifier::Identifier;

/// Port a remote cask daemon listens on when none is given.
pub const DEFAULT_PORT: u16 = 2223;

/// Address of an execution target.
///
/// `name` denotes a unit on the local daemon; `host[:port]/name` denotes a
/// unit managed by a remote daemon. Locators are immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Local {
        id: Identifier,
    },
    Remote {
        host: String,
        port: u16,
        id: Identifier,
    },
}

impl Locator {
    /// Parse a user-supplied target string.
    ///
    /// Grammar: no `/` means a local identifier; `host[:port]/id` means a
    /// remote target with [`DEFAULT_PORT`] when `:port` is omitted.
    pub fn parse(s: &str) -> Result<Self, CaskError> {
        match s.split_once('/') {
            None => Ok(Locator::Local {
                id: Identifier::new(s)?,
            }),
            Some((addr, name)) => {
                let (host, port) = match addr.split_once(':') {
                    None => (addr, DEFAULT_PORT),
                    Some((host, port)) => {
                        let port = port.parse::<u16>().map_err(|_| CaskError::InvalidLocator {
                            input: s.to_string(),
                            reason: format!("'{}' is not a valid port", port),
                        })?;
                        (host, port)
                    }
                };
                if host.is_empty() {
                    return Err(CaskError::InvalidLocator {
                        input: s.to_string(),
                        reason: "host must not be empty".to_string(),
                    });
                }
                let id = Identifier::new(name).map_err(|_| CaskError::InvalidLocator {
                    input: s.to_string(),
                    reason: format!("'{}' is not a valid identifier", name),
                })?;
                Ok(Locator::Remote {
                    host: host.to_string(),
                    port,
                    id,
                })
            }
        }
    }

    /// Parse every argument independently so the caller can report all
    /// malformed targets at once.
    pub fn parse_all(args: &[String]) -> Result<Vec<Locator>, Vec<CaskError>> {
        let mut locators = Vec::with_capacity(args.len());
        let mut errors = Vec::new();
        for arg in args {
            match Locator::parse(arg) {
                Ok(locator) => locators.push(locator),
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() {
            Ok(locators)
        } else {
            Err(errors)
        }
    }

    pub fn id(&self) -> &Identifier {
        match self {
            Locator::Local { id } => id,
            Locator::Remote { id, .. } => id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Locator::Local { .. })
    }
}

impl FromStr for Locator {
    type Err = CaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locator::parse(s)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Local { id } => write!(f, "{}", id),
            Locator::Remote { host, port, id } => write!(f, "{}:{}/{}", host, port, id),
        }
    }
}
