//! University wallet generation and the wallet key file.
//!
//! Two files are written into the wallets directory:
//!
//! * `.university-wallets.json`: `{name, id, address, privateKey}` entries.
//!   Secret; created with mode `0600` and listed in `.gitignore`.
//! * `university-wallets-public.json`: the same entries without keys.

use std::io::Write;
use std::path::{Path, PathBuf};

use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::abi::{keccak256, Address};
use crate::errors::{EndaomentError, Result};

pub const SECRET_FILE: &str = ".university-wallets.json";
pub const PUBLIC_FILE: &str = "university-wallets-public.json";

const GITIGNORE_ENTRY: &str = "\n# University wallets (contains private keys)\n.university-wallets.json\n";

/// Institutional identities, `(display name, id)`.
pub const IDENTITIES: [(&str, &str); 6] = [
    ("UNAM", "unam"),
    ("IBERO", "ibero"),
    ("BUAP", "buap"),
    ("UDLAP", "udlap"),
    ("ANAHUAC", "anahuac"),
    ("TEC", "tec"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversityWallet {
    pub name: String,
    pub id: String,
    pub address: String,
    pub private_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicWallet {
    pub name: String,
    pub id: String,
    pub address: String,
}

impl UniversityWallet {
    pub fn address(&self) -> Result<Address> {
        self.address
            .parse()
            .map_err(|_| EndaomentError::Wallet(format!("invalid address for {}: {}", self.id, self.address)))
    }

    pub fn public(&self) -> PublicWallet {
        PublicWallet {
            name: self.name.clone(),
            id: self.id.clone(),
            address: self.address.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────
// Key handling
// ─────────────────────────────────────────────────────────

/// Ethereum address of a secp256k1 key: last 20 bytes of the keccak hash of
/// the uncompressed public point.
pub fn address_of(key: &SigningKey) -> Address {
    let point = key.verifying_key().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address(bytes)
}

/// EIP-55 mixed-case rendering.
pub fn checksum_address(address: &Address) -> String {
    let lower = hex::encode(address.as_bytes());
    let hash = keccak256(lower.as_bytes());
    let mixed: String = lower
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect();
    format!("0x{mixed}")
}

fn wallet_from_key(name: &str, id: &str, key: &SigningKey) -> UniversityWallet {
    UniversityWallet {
        name: name.to_string(),
        id: id.to_string(),
        address: checksum_address(&address_of(key)),
        private_key: format!("0x{}", hex::encode(key.to_bytes())),
    }
}

/// Fresh random wallets for every identity in [`IDENTITIES`].
pub fn generate() -> Vec<UniversityWallet> {
    IDENTITIES
        .iter()
        .map(|(name, id)| {
            let wallet = wallet_from_key(name, id, &SigningKey::random(&mut OsRng));
            info!("Generated wallet for {}: {}", wallet.name, wallet.address);
            wallet
        })
        .collect()
}

// ─────────────────────────────────────────────────────────
// Files
// ─────────────────────────────────────────────────────────

pub fn secret_path(dir: &Path) -> PathBuf {
    dir.join(SECRET_FILE)
}

pub fn public_path(dir: &Path) -> PathBuf {
    dir.join(PUBLIC_FILE)
}

fn write_secret(path: &Path, contents: &str) -> Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents.as_bytes())?;
    Ok(())
}

/// Append the secret file to `<dir>/.gitignore` unless already listed.
/// Returns whether the file changed.
pub fn ensure_gitignore(dir: &Path) -> Result<bool> {
    let path = dir.join(".gitignore");
    let existing = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if existing.contains(SECRET_FILE) {
        return Ok(false);
    }
    std::fs::write(&path, existing + GITIGNORE_ENTRY)?;
    info!("Added {SECRET_FILE} to .gitignore");
    Ok(true)
}

/// Write the secret and public files and update `.gitignore`.
pub fn write_files(dir: &Path, wallets: &[UniversityWallet]) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let secret = secret_path(dir);
    write_secret(&secret, &serde_json::to_string_pretty(wallets)?)?;
    warn!("{} contains private keys. Do not commit it.", secret.display());

    let public: Vec<PublicWallet> = wallets.iter().map(UniversityWallet::public).collect();
    let public_file = public_path(dir);
    std::fs::write(&public_file, serde_json::to_string_pretty(&public)?)?;
    info!("Public addresses saved to {}", public_file.display());

    ensure_gitignore(dir)?;
    Ok(())
}

/// Raw secret file contents, `None` when it does not exist.
pub fn raw_contents(dir: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(secret_path(dir)) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Parsed secret file, `None` when it does not exist.
pub fn load(dir: &Path) -> Result<Option<Vec<UniversityWallet>>> {
    let Some(raw) = raw_contents(dir)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| EndaomentError::Wallet(format!("cannot parse {SECRET_FILE}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_of_private_key_one() {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        let key = SigningKey::from_slice(&bytes).unwrap();
        assert_eq!(
            address_of(&key).to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }

    #[test]
    fn eip55_checksum() {
        let address: Address = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed".parse().unwrap();
        assert_eq!(checksum_address(&address), "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed");
    }

    #[test]
    fn generates_one_wallet_per_identity() {
        let wallets = generate();
        assert_eq!(wallets.len(), IDENTITIES.len());
        assert_eq!(wallets[0].id, "unam");
        assert_eq!(wallets[0].private_key.len(), 66);
        assert!(wallets.iter().all(|w| w.address().is_ok()));
    }

    #[test]
    fn files_round_trip_and_gitignore_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();
        let wallets = generate();
        write_files(dir.path(), &wallets).unwrap();

        assert_eq!(load(dir.path()).unwrap().unwrap(), wallets);

        let public = std::fs::read_to_string(public_path(dir.path())).unwrap();
        assert!(!public.contains("privateKey"));
        assert!(public.contains(&wallets[0].address));

        let gitignore = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(gitignore.starts_with("target/\n"));
        assert!(gitignore.contains(".university-wallets.json"));
        assert!(!ensure_gitignore(dir.path()).unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn secret_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        write_files(dir.path(), &generate()).unwrap();
        let mode = std::fs::metadata(secret_path(dir.path())).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn malformed_secret_file_is_a_wallet_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(secret_path(dir.path()), "{not json").unwrap();
        assert!(matches!(load(dir.path()), Err(EndaomentError::Wallet(_))));
    }
}
