//! System V IPC keys.
//!
//! A key is the only thing two independent threads or processes need to
//! agree on to rendezvous on the same semaphore set.

use std::ffi::CString;
use std::fmt;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::error::SemError;

/// A System V IPC key identifying a semaphore set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SemKey(libc::key_t);

impl SemKey {
    /// Wraps a raw key value.
    #[must_use]
    pub const fn from_raw(raw: libc::key_t) -> Self {
        Self(raw)
    }

    /// The private key: every `create` with it allocates a fresh, anonymous set.
    #[must_use]
    pub const fn private() -> Self {
        Self(libc::IPC_PRIVATE)
    }

    /// Derives a key from an existing filesystem path and a project id via `ftok`.
    ///
    /// The path must exist and stay on the same inode for every participant,
    /// otherwise they will derive different keys.
    ///
    /// # Errors
    /// Returns `SemError::KeyDerivation` if the path does not exist or contains
    /// an interior NUL byte.
    pub fn from_path(path: &Path, project_id: u8) -> Result<Self, SemError> {
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| SemError::KeyDerivation {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"),
        })?;

        let key = unsafe { libc::ftok(c_path.as_ptr(), libc::c_int::from(project_id)) };
        if key == -1 {
            return Err(SemError::KeyDerivation {
                path: path.to_path_buf(),
                source: io::Error::last_os_error(),
            });
        }

        Ok(Self(key))
    }

    /// Derives a key from an arbitrary name.
    ///
    /// The key is the low 31 bits of the name's blake3 digest, so it is stable
    /// across runs and processes and never collides with the private key.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let digest = blake3::hash(name.as_bytes());
        let bytes = digest.as_bytes();
        let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) & 0x7fff_ffff;
        if raw == libc::IPC_PRIVATE {
            Self(1)
        } else {
            Self(raw)
        }
    }

    /// Returns the raw key value.
    #[must_use]
    pub const fn raw(self) -> libc::key_t {
        self.0
    }

    /// Returns true if this is the private key.
    #[must_use]
    pub const fn is_private(self) -> bool {
        self.0 == libc::IPC_PRIVATE
    }
}

impl fmt::Display for SemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_name_keys_are_stable() {
        let a = SemKey::from_name("bank");
        let b = SemKey::from_name("bank");
        let c = SemKey::from_name("bridge");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.raw() > 0);
        assert!(!a.is_private());
    }

    #[test]
    fn test_private_key() {
        assert!(SemKey::private().is_private());
    }

    #[test]
    fn test_path_keys_match_for_same_path() {
        let dir = tempdir().unwrap();
        let a = SemKey::from_path(dir.path(), 1).unwrap();
        let b = SemKey::from_path(dir.path(), 1).unwrap();
        let c = SemKey::from_path(dir.path(), 2).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_path_key_requires_existing_path() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");
        let err = SemKey::from_path(&missing, 1).unwrap_err();
        assert!(matches!(err, SemError::KeyDerivation { .. }));
    }

    #[test]
    fn test_display_is_hex() {
        assert_eq!(SemKey::from_raw(0x2a).to_string(), "0x0000002a");
    }
}
