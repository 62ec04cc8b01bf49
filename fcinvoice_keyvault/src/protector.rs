//! Platform "protect for current identity" primitives
//!
//! - Windows: DPAPI, current-user scope
//! - Elsewhere: AES-256-GCM under a key derived from the local machine id,
//!   user name and home directory. A blob written by one user/machine fails
//!   authentication everywhere else.

use std::sync::Arc;

use secrecy::SecretBox;
use zeroize::Zeroizing;

use crate::crypto::{derive_wrapping_key, open, seal};
use crate::error::{KeyVaultError, Result};

/// Wraps and unwraps the installation key blob for the owning identity.
pub trait IdentityProtector: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

/// Files consulted for a stable machine identifier
const MACHINE_ID_PATHS: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Environment variables naming the current user
const USER_VARS: &[&str] = &["USER", "USERNAME", "LOGNAME"];

/// Portable identity protector
pub struct LocalIdentityProtector {
    wrapping_key: SecretBox<[u8; 32]>,
}

impl LocalIdentityProtector {
    /// Bind to explicit identity bytes
    pub fn from_identity(identity: &[u8]) -> Result<Self> {
        Ok(Self {
            wrapping_key: derive_wrapping_key(identity)?,
        })
    }

    /// Bind to the current user on this machine
    pub fn current_user() -> Result<Self> {
        let identity = local_identity()?;
        Self::from_identity(&identity)
    }
}

impl IdentityProtector for LocalIdentityProtector {
    fn name(&self) -> &'static str {
        "local-identity"
    }

    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        seal(&self.wrapping_key, plaintext)
    }

    fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        open(&self.wrapping_key, blob)
    }
}

/// Collect identity material: machine id, user name, home directory.
fn local_identity() -> Result<Zeroizing<Vec<u8>>> {
    let mut identity = Zeroizing::new(Vec::new());

    for path in MACHINE_ID_PATHS {
        if let Ok(id) = std::fs::read_to_string(path) {
            let id = id.trim();
            if !id.is_empty() {
                push_component(&mut identity, "machine", id);
                break;
            }
        }
    }

    if let Some(user) = USER_VARS
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
    {
        push_component(&mut identity, "user", &user);
    }

    if let Some(home) = dirs::home_dir() {
        push_component(&mut identity, "home", &home.to_string_lossy());
    }

    if identity.is_empty() {
        return Err(KeyVaultError::IdentityUnavailable);
    }
    Ok(identity)
}

fn push_component(identity: &mut Vec<u8>, label: &str, value: &str) {
    identity.extend_from_slice(label.as_bytes());
    identity.push(b':');
    identity.extend_from_slice(value.as_bytes());
    identity.push(0);
}

#[cfg(windows)]
pub use dpapi::DpapiProtector;

#[cfg(windows)]
mod dpapi {
    //! DPAPI, current-user scope

    use std::ptr;

    use winapi::um::dpapi::{CryptProtectData, CryptUnprotectData};
    use winapi::um::wincrypt::DATA_BLOB;
    use zeroize::Zeroizing;

    use super::IdentityProtector;
    use crate::error::{KeyVaultError, Result};

    pub struct DpapiProtector;

    impl IdentityProtector for DpapiProtector {
        fn name(&self) -> &'static str {
            "dpapi"
        }

        fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
            let mut input_blob = DATA_BLOB {
                cbData: plaintext.len() as u32,
                pbData: plaintext.as_ptr() as *mut u8,
            };
            let mut output_blob = DATA_BLOB {
                cbData: 0,
                pbData: ptr::null_mut(),
            };

            let result = unsafe {
                CryptProtectData(
                    &mut input_blob,
                    ptr::null(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    0,
                    &mut output_blob,
                )
            };
            if result == 0 {
                return Err(KeyVaultError::Crypto("DPAPI protect failed".into()));
            }

            let protected = unsafe {
                std::slice::from_raw_parts(output_blob.pbData, output_blob.cbData as usize).to_vec()
            };
            unsafe {
                winapi::um::winbase::LocalFree(output_blob.pbData as _);
            }
            Ok(protected)
        }

        fn unprotect(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
            let mut input_blob = DATA_BLOB {
                cbData: blob.len() as u32,
                pbData: blob.as_ptr() as *mut u8,
            };
            let mut output_blob = DATA_BLOB {
                cbData: 0,
                pbData: ptr::null_mut(),
            };

            let result = unsafe {
                CryptUnprotectData(
                    &mut input_blob,
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    0,
                    &mut output_blob,
                )
            };
            if result == 0 {
                return Err(KeyVaultError::DecryptionFailed("DPAPI unprotect failed".into()));
            }

            let plaintext = unsafe {
                let out =
                    std::slice::from_raw_parts_mut(output_blob.pbData, output_blob.cbData as usize);
                let copy = Zeroizing::new(out.to_vec());
                // Scrub DPAPI's copy before releasing it.
                zeroize::Zeroize::zeroize(out);
                copy
            };
            unsafe {
                winapi::um::winbase::LocalFree(output_blob.pbData as _);
            }
            Ok(plaintext)
        }
    }
}

/// The default protector for this platform
pub fn platform_protector() -> Result<Arc<dyn IdentityProtector>> {
    #[cfg(windows)]
    {
        Ok(Arc::new(DpapiProtector))
    }

    #[cfg(not(windows))]
    {
        Ok(Arc::new(LocalIdentityProtector::current_user()?))
    }
}
