//! Implementation of `org.freedesktop.Secret.Session` D-Bus interface and
//! the session cryptography subsystem (key exchange, transport
//! encrypt/decrypt).
//!
//! The state tracked by a `Session` is used to encrypt and decrypt secrets.
//! So, although not part of the `org.freedesktop.Secret.Session` D-Bus
//! interface, we implement key exchange and encryption/decryption here,
//! next to the object that owns the resulting key.
use aes::cipher::{block_padding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use num_bigint::{BigUint, RandBigInt};
use num_traits::Num;
use rand::{thread_rng, RngCore};

use crate::error;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// RFC 2409 "Second Oakley Group": the 1024-bit MODP group, generator 2.
const MODP_1024_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD",
    "129024E088A67CC74020BBEA63B139B22514A08798E3404",
    "DDEF9519B3CD3A431B302B0A6DF25F14374FE1356D6D51C2",
    "45E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7",
    "EDEE386BFB5A899FA5AE9F24117C4B1FE649286651ECE653",
    "81FFFFFFFFFFFFFFFF"
);

/// Width, in bytes, of a DH public value on the wire: 128 bytes, big-endian.
const DH_FIELD_SIZE: usize = 128;

fn modp_1024_prime() -> BigUint {
    BigUint::from_str_radix(MODP_1024_PRIME_HEX, 16).expect("hard-coded MODP-1024 prime is valid hex")
}

/// Serializes a `BigUint` as exactly `DH_FIELD_SIZE` bytes, big-endian,
/// zero-padded on the left.
fn to_fixed_width_be(value: &BigUint) -> Vec<u8> {
    let bytes = value.to_bytes_be();
    let mut padded = vec![0u8; DH_FIELD_SIZE - bytes.len()];
    padded.extend_from_slice(&bytes);
    padded
}

/// Supported encryption algorithms.
///
/// Based on: https://specifications.freedesktop.org/secret-service-spec/latest/transfer-secrets.html,
/// only two algorithms are supported: `Algorithm::Plain` or `Algorithm::Dh`,
/// short for `dh-ietf1024-sha256-aes128-cbc-pkcs7`.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum Algorithm {
    Plain,
    Dh { aes_key: [u8; 16] },
}

impl Algorithm {
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), error::Error> {
        match self {
            Algorithm::Dh { aes_key } => {
                let mut iv = [0u8; 16];
                thread_rng().fill_bytes(&mut iv);

                let ciphertext = Aes128CbcEnc::new(aes_key.into(), &iv.into())
                    .encrypt_padded_vec_mut::<block_padding::Pkcs7>(plaintext);
                Ok((ciphertext, iv.to_vec()))
            }
            Algorithm::Plain => Ok((plaintext.to_vec(), Vec::new())),
        }
    }

    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>, error::Error> {
        match self {
            Algorithm::Dh { aes_key } => {
                if iv.len() != 16 {
                    return Err(error::Error::Crypto(
                        "initialization vector must be 16 bytes".to_owned(),
                    ));
                }

                Aes128CbcDec::new(aes_key.into(), iv.into())
                    .decrypt_padded_vec_mut::<block_padding::Pkcs7>(ciphertext)
                    .map_err(|e| error::Error::Crypto(e.to_string()))
            }
            Algorithm::Plain => Ok(ciphertext.to_vec()),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Session {
    pub algorithm: Algorithm,
    object_path: zvariant::OwnedObjectPath,
}

impl Session {
    pub fn object_path(&self) -> zvariant::OwnedObjectPath {
        self.object_path.clone()
    }

    pub fn new_plain(object_path: zvariant::OwnedObjectPath) -> Session {
        Session {
            algorithm: Algorithm::Plain,
            object_path,
        }
    }

    /// Performs a MODP-1024/g=2 Diffie-Hellman exchange and derives a
    /// 128-bit AES key via HKDF-SHA-256(salt = "", info = "").
    ///
    /// `client_public` must be exactly 128 bytes, big-endian. Returns the new
    /// session along with our own public value, also 128 bytes big-endian.
    pub fn new_dh(
        object_path: zvariant::OwnedObjectPath,
        client_public: &[u8],
    ) -> Result<(Session, [u8; DH_FIELD_SIZE]), error::Error> {
        if client_public.len() != DH_FIELD_SIZE {
            return Err(error::Error::Crypto(format!(
                "DH public value must be {} bytes, got {}",
                DH_FIELD_SIZE,
                client_public.len()
            )));
        }

        let prime = modp_1024_prime();
        let generator = BigUint::from(2u32);

        let private_key = thread_rng().gen_biguint_below(&prime);
        let our_public = generator.modpow(&private_key, &prime);

        let their_public = BigUint::from_bytes_be(client_public);
        let shared_secret = their_public.modpow(&private_key, &prime);
        let shared_secret_padded = to_fixed_width_be(&shared_secret);

        let salt: Option<&[u8]> = None;
        let info: &[u8] = &[];
        let (_, hk) = hkdf::Hkdf::<sha2::Sha256>::extract(salt, &shared_secret_padded);
        let mut aes_key = [0u8; 16];
        hk.expand(info, &mut aes_key)?;

        let mut our_public_bytes = [0u8; DH_FIELD_SIZE];
        our_public_bytes.copy_from_slice(&to_fixed_width_be(&our_public));

        Ok((
            Session {
                algorithm: Algorithm::Dh { aes_key },
                object_path,
            },
            our_public_bytes,
        ))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), error::Error> {
        self.algorithm.encrypt(plaintext)
    }

    pub fn decrypt(&self, ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>, error::Error> {
        self.algorithm.decrypt(ciphertext, iv)
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self.algorithm, Algorithm::Dh { .. })
    }
}

/// Resolves a live `Session` object registered at `path`, failing with
/// `NoSession` if it doesn't exist (peer disconnected, bad path, ...).
pub async fn resolve(
    object_server: &zbus::ObjectServer,
    path: &zvariant::ObjectPath<'_>,
) -> Result<Session, error::Error> {
    let iface = object_server
        .interface::<_, Session>(path)
        .await
        .map_err(|_| error::Error::NoSession(path.as_str().to_owned()))?;
    let session = iface.get().await;
    Ok(session.clone())
}

#[zbus::interface(name = "org.freedesktop.Secret.Session")]
impl Session {
    /// Close method
    async fn close(
        &mut self,
        #[zbus(object_server)] object_server: &zbus::ObjectServer,
    ) -> Result<(), error::Error> {
        object_server.remove::<Session, _>(self.object_path()).await?;
        Ok(())
    }
}
