//! Cookie persistence.
//!
//! The cookie is the sole resumption contract with the provider and is
//! treated as an opaque byte string. Two interchangeable backends exist:
//! a length-prefixed flat file, or an attribute on a designated local
//! configuration entry. A missing, short or otherwise corrupt cookie
//! reads as "no cookie": it forces a full transfer, never a crash.

use crate::config::CookieBackend;
use crate::error::{SyncError, SyncResult};
use dirsync_model::{Attribute, AttributeChange, Dn, EntryStore};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// The attribute holding the cookie in the entry backend.
pub(crate) const COOKIE_ATTRIBUTE: &str = "replcookie";

/// Persists and restores the resumption cookie.
pub struct CookieStore {
    backend: Backend,
}

enum Backend {
    File { path: PathBuf },
    Entry { store: Arc<dyn EntryStore>, dn: Dn },
}

impl CookieStore {
    /// Opens the backend selected by configuration.
    ///
    /// The entry backend needs access to the local store; the file
    /// backend creates its directory on first use.
    pub fn open(
        backend: &CookieBackend,
        replica_id: &str,
        store: Arc<dyn EntryStore>,
    ) -> SyncResult<Self> {
        match backend {
            CookieBackend::File { dir } => {
                fs::create_dir_all(dir)?;
                Ok(Self {
                    backend: Backend::File {
                        path: dir.join(replica_id),
                    },
                })
            }
            CookieBackend::Entry { config_entry_dn } => Ok(Self {
                backend: Backend::Entry {
                    store,
                    dn: config_entry_dn.clone(),
                },
            }),
        }
    }

    /// Loads the persisted cookie, if a usable one exists.
    pub fn load(&self) -> Option<Vec<u8>> {
        match &self.backend {
            Backend::File { path } => {
                let bytes = fs::read(path).ok()?;

                let (len_byte, rest) = bytes.split_first()?;
                let len = *len_byte as usize;

                if rest.len() < len {
                    // truncated write: treat as absent
                    warn!(path = %path.display(), "ignoring corrupt cookie file");
                    return None;
                }

                Some(rest[..len].to_vec())
            }
            Backend::Entry { store, dn } => {
                let entry = store.lookup(dn).ok()?;
                let value = entry.get(COOKIE_ATTRIBUTE)?.first()?;

                match decode_hex(value) {
                    Some(cookie) => Some(cookie),
                    None => {
                        warn!(%dn, "ignoring undecodable cookie attribute");
                        None
                    }
                }
            }
        }
    }

    /// Persists the cookie.
    pub fn save(&self, cookie: &[u8]) -> SyncResult<()> {
        match &self.backend {
            Backend::File { path } => {
                if cookie.len() > u8::MAX as usize {
                    return Err(SyncError::CookieTooLarge(cookie.len()));
                }

                let mut bytes = Vec::with_capacity(cookie.len() + 1);
                bytes.push(cookie.len() as u8);
                bytes.extend_from_slice(cookie);
                fs::write(path, bytes)?;
                debug!(path = %path.display(), "stored cookie");
                Ok(())
            }
            Backend::Entry { store, dn } => {
                let change = AttributeChange::Replace(Attribute::with_values(
                    COOKIE_ATTRIBUTE,
                    [encode_hex(cookie)],
                ));
                store.modify(dn, &[change])?;
                debug!(%dn, "stored cookie");
                Ok(())
            }
        }
    }

    /// Removes any persisted cookie.
    pub fn clear(&self) -> SyncResult<()> {
        match &self.backend {
            Backend::File { path } => {
                match fs::remove_file(path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                Ok(())
            }
            Backend::Entry { store, dn } => {
                let change = AttributeChange::Remove(Attribute::new(COOKIE_ATTRIBUTE));
                match store.modify(dn, &[change]) {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        // the config entry may not exist yet
                        warn!(%dn, error = %e, "failed to clear cookie attribute");
                        Ok(())
                    }
                }
            }
        }
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }

    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
