// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use base64::{engine::general_purpose, Engine as _};
use cborcrypto::cbor::{CborMap, CborValue, DecodeOptions, MapOrdering};
use cborcrypto::cose::{
    self, constants::COTX_TAG, AsymKeyEncapsulation, AsymKeyRecovery, AsymSigner, AsymVerifier,
    Decrypter, Encrypter, HmacSigner, HmacVerifier, Policy, Signer, SymKeyEncapsulation,
    SymKeyRecovery, Validator,
};
use cborcrypto::crypto::{
    AsymSignatureAlgorithm, ContentEncryptionAlgorithm, HmacAlgorithm, KeyEncryptionAlgorithm,
};
use cborcrypto::store::{IKeyStore, KeyEntry, MemoKeyStore};
use clap::{Parser, ValueEnum};
use std::error::Error;
use std::fs;
use std::io::Write;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
enum CborCryptoCli {
    Decode(DecodeArgs),
    Encode(EncodeArgs),
    Encrypt(EncryptArgs),
    Decrypt(DecryptArgs),
    Sign(SignArgs),
    Verify(VerifyArgs),
}

/// How CBOR is read from or written to a file
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Format {
    #[default]
    Binary,
    Hex,
    /// base64url without padding
    B64u,
    /// diagnostic notation
    Diag,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum Ordering {
    /// RFC 8949
    #[default]
    Bytewise,
    /// RFC 7049
    LengthFirst,
}

impl From<Ordering> for MapOrdering {
    fn from(o: Ordering) -> Self {
        match o {
            Ordering::Bytewise => MapOrdering::Bytewise,
            Ordering::LengthFirst => MapOrdering::LengthFirst,
        }
    }
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Decode the supplied CBOR object and print it in diagnostic notation")]
struct DecodeArgs {
    #[arg(short, long, default_value = "object.cbor")]
    input: String,

    #[arg(short, long, value_enum, default_value_t)]
    format: Format,

    /// Accept non-deterministic encodings
    #[arg(long)]
    lenient: bool,

    #[arg(long, value_enum, default_value_t)]
    ordering: Ordering,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Encode the supplied diagnostic notation as deterministic CBOR")]
struct EncodeArgs {
    #[arg(short, long, default_value = "object.diag")]
    input: String,

    /// Write to this file instead of standard output
    #[arg(short, long)]
    output: Option<String>,

    #[arg(short, long, value_enum, default_value_t = Format::Hex)]
    format: Format,

    #[arg(long, value_enum, default_value_t)]
    ordering: Ordering,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Encrypt the supplied file using a key from the key store")]
struct EncryptArgs {
    #[arg(short, long)]
    input: String,

    #[arg(short, long)]
    output: Option<String>,

    #[arg(short, long, value_enum, default_value_t = Format::Hex)]
    format: Format,

    #[arg(short, long, default_value = "keys.json")]
    keystore: String,

    #[arg(long)]
    key_id: String,

    /// Content encryption algorithm
    #[arg(short, long, default_value = "A256GCM")]
    algorithm: String,

    /// Key encryption algorithm; the key must be a secret when absent
    #[arg(short = 'e', long)]
    key_encryption: Option<String>,

    /// Embed the recipient public key
    #[arg(long)]
    public_key: bool,

    /// Leave the key id out of the envelope
    #[arg(long)]
    anonymous: bool,

    #[arg(long, value_enum, default_value_t)]
    ordering: Ordering,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Decrypt the supplied envelope using a key from the key store")]
struct DecryptArgs {
    #[arg(short, long)]
    input: String,

    #[arg(short, long, value_enum, default_value_t)]
    format: Format,

    #[arg(short, long)]
    output: Option<String>,

    #[arg(short, long, default_value = "keys.json")]
    keystore: String,

    /// Key to use when the envelope carries no key id
    #[arg(long)]
    key_id: Option<String>,

    /// Accept a tagged envelope
    #[arg(long)]
    allow_tag: bool,

    /// Accept custom data
    #[arg(long)]
    allow_custom_data: bool,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Sign the supplied CBOR map using a key from the key store")]
struct SignArgs {
    #[arg(short, long)]
    input: String,

    #[arg(long, value_enum, default_value_t = Format::Diag)]
    input_format: Format,

    #[arg(short, long)]
    output: Option<String>,

    #[arg(short, long, value_enum, default_value_t = Format::Diag)]
    format: Format,

    #[arg(short, long, default_value = "keys.json")]
    keystore: String,

    #[arg(long)]
    key_id: String,

    /// Signature algorithm, HMAC or asymmetric
    #[arg(short, long, default_value = "ES256")]
    algorithm: String,

    /// Signature label, in diagnostic notation
    #[arg(short, long, default_value = "0")]
    label: String,

    #[arg(long)]
    public_key: bool,

    #[arg(long)]
    anonymous: bool,
}

#[derive(Debug, clap::Args)]
#[command(author, version, long_about = None,
    about = "Verify the signature of the supplied CBOR map")]
struct VerifyArgs {
    #[arg(short, long)]
    input: String,

    #[arg(short, long, value_enum, default_value_t = Format::Diag)]
    format: Format,

    #[arg(short, long, default_value = "keys.json")]
    keystore: String,

    #[arg(long)]
    key_id: Option<String>,

    #[arg(short, long, default_value = "0")]
    label: String,

    #[arg(long)]
    allow_tag: bool,

    #[arg(long)]
    allow_custom_data: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let res = match CborCryptoCli::parse() {
        CborCryptoCli::Decode(args) => decode(&args).map_err(|e| ("decoding", e)),
        CborCryptoCli::Encode(args) => encode(&args).map_err(|e| ("encoding", e)),
        CborCryptoCli::Encrypt(args) => encrypt(&args).map_err(|e| ("encryption", e)),
        CborCryptoCli::Decrypt(args) => decrypt(&args).map_err(|e| ("decryption", e)),
        CborCryptoCli::Sign(args) => sign(&args).map_err(|e| ("signing", e)),
        CborCryptoCli::Verify(args) => verify(&args).map_err(|e| ("verification", e)),
    };

    if let Err((what, e)) = res {
        eprintln!("{what} failed: {e}");
        std::process::exit(1);
    }
}

fn read_bytes(path: &str, format: Format) -> Result<Vec<u8>, Box<dyn Error>> {
    let raw = fs::read(path)?;
    let text = |raw: Vec<u8>| -> Result<String, Box<dyn Error>> {
        Ok(String::from_utf8(raw)?.split_whitespace().collect())
    };

    Ok(match format {
        Format::Binary => raw,
        Format::Hex => hex::decode(text(raw)?)?,
        Format::B64u => general_purpose::URL_SAFE_NO_PAD
            .decode(text(raw)?.trim_end_matches('='))?,
        Format::Diag => CborValue::from_diagnostic(&String::from_utf8(raw)?)?.encode(),
    })
}

fn read_cbor(
    path: &str,
    format: Format,
    options: DecodeOptions,
) -> Result<CborValue, Box<dyn Error>> {
    match format {
        Format::Diag => Ok(CborValue::from_diagnostic_with(
            &fs::read_to_string(path)?,
            options.ordering,
        )?),
        _ => Ok(CborValue::decode_with(&read_bytes(path, format)?, options)?),
    }
}

fn write_out(bytes: &[u8], output: Option<&str>) -> Result<(), Box<dyn Error>> {
    match output {
        Some(path) => fs::write(path, bytes)?,
        None => std::io::stdout().write_all(bytes)?,
    }
    Ok(())
}

fn write_cbor(
    value: &CborValue,
    output: Option<&str>,
    format: Format,
) -> Result<(), Box<dyn Error>> {
    let out = match format {
        Format::Binary => value.encode(),
        Format::Hex => format!("{}\n", hex::encode(value.encode())).into_bytes(),
        Format::B64u => {
            format!("{}\n", general_purpose::URL_SAFE_NO_PAD.encode(value.encode())).into_bytes()
        }
        Format::Diag => format!("{}\n", value.to_diagnostic()).into_bytes(),
    };
    write_out(&out, output)
}

fn load_keystore(path: &str) -> Result<Arc<MemoKeyStore>, Box<dyn Error>> {
    let j = fs::read_to_string(path)?;

    let ks: MemoKeyStore = Default::default();
    ks.load_json(&j)?;

    Ok(Arc::new(ks))
}

fn lookup(ks: &MemoKeyStore, key_id: &str) -> Result<KeyEntry, Box<dyn Error>> {
    ks.lookup(key_id)
        .ok_or_else(|| format!("key {key_id} not found").into())
}

/// Picks the store entry named by the envelope, or by the command line when
/// the envelope is anonymous
fn locate(
    ks: &MemoKeyStore,
    key_id: Option<&CborValue>,
    fallback: Option<&str>,
) -> Result<KeyEntry, cose::Error> {
    let name = match key_id {
        Some(v) => v
            .as_text()
            .map_err(|_| cose::Error::KeyLocator(format!("unsupported key id {v}")))?,
        None => fallback.ok_or_else(|| cose::Error::KeyLocator("no key id".to_string()))?,
    };

    ks.lookup(name)
        .ok_or_else(|| cose::Error::KeyLocator(format!("key {name} not found")))
}

/// The map of a plain, tagged or typed-object container
fn container(v: &CborValue) -> Option<&CborMap> {
    match v {
        CborValue::Tag(t) if t.number() == COTX_TAG => {
            t.item().as_array().ok()?.get(1)?.as_map().ok()
        }
        CborValue::Tag(t) => t.item().as_map().ok(),
        other => other.as_map().ok(),
    }
}

fn policy(allow: bool) -> Policy {
    if allow {
        Policy::Optional
    } else {
        Policy::Forbidden
    }
}

fn report(what: &'static str) -> impl Fn(&CborValue) -> Result<(), cose::Error> + Send + Sync {
    move |v: &CborValue| {
        println!("{what}: {v}");
        Ok(())
    }
}

fn decode(args: &DecodeArgs) -> Result<(), Box<dyn Error>> {
    let options = if args.lenient {
        DecodeOptions::lenient()
    } else {
        DecodeOptions::default()
    }
    .with_ordering(args.ordering.into());

    let v = read_cbor(&args.input, args.format, options)?;
    println!("{v}");

    Ok(())
}

fn encode(args: &EncodeArgs) -> Result<(), Box<dyn Error>> {
    let text = fs::read_to_string(&args.input)?;
    let v = CborValue::from_diagnostic_with(&text, args.ordering.into())?;

    write_cbor(&v, args.output.as_deref(), args.format)
}

fn encrypt(args: &EncryptArgs) -> Result<(), Box<dyn Error>> {
    let ks = load_keystore(&args.keystore)?;
    let entry = lookup(&ks, &args.key_id)?;
    let algorithm = ContentEncryptionAlgorithm::from_name(&args.algorithm)?;
    let plain_text = fs::read(&args.input)?;

    let envelope = match &args.key_encryption {
        None => {
            let secret = entry
                .secret()
                .ok_or_else(|| format!("key {} is not a secret", args.key_id))?;
            let mut e = Encrypter::new(algorithm, SymKeyEncapsulation::new(secret.to_vec()))
                .with_ordering(args.ordering.into());
            if !args.anonymous {
                e = e.with_key_id(args.key_id.as_str());
            }
            e.encrypt(&plain_text)?
        }
        Some(name) => {
            let public_key = entry
                .public_key()?
                .ok_or_else(|| format!("key {} has no public key", args.key_id))?;
            let encapsulation =
                AsymKeyEncapsulation::new(KeyEncryptionAlgorithm::from_name(name)?, public_key)?
                    .with_public_key(args.public_key);
            let mut e =
                Encrypter::new(algorithm, encapsulation).with_ordering(args.ordering.into());
            if !args.anonymous {
                e = e.with_key_id(args.key_id.as_str());
            }
            e.encrypt(&plain_text)?
        }
    };

    write_cbor(&envelope, args.output.as_deref(), args.format)
}

fn decrypt(args: &DecryptArgs) -> Result<(), Box<dyn Error>> {
    let ks = load_keystore(&args.keystore)?;
    let envelope = read_cbor(&args.input, args.format, DecodeOptions::default())?;

    let key_encrypted = container(&envelope)
        .map(|m| m.contains_key(cose::constants::KEY_ENCRYPTION_LABEL))
        .unwrap_or(false);

    let fallback = args.key_id.clone();
    let plain_text = if key_encrypted {
        let recovery = AsymKeyRecovery::new(move |_, key_id, _, _| {
            locate(&ks, key_id, fallback.as_deref())?
                .private_key()
                .cloned()
                .ok_or_else(|| cose::Error::KeyLocator("not a private key".to_string()))
        });
        Decrypter::new(recovery)
            .with_tag_policy(policy(args.allow_tag), report("tag"))
            .with_custom_data_policy(policy(args.allow_custom_data), report("custom data"))
            .decrypt(&envelope)?
    } else {
        let recovery = SymKeyRecovery::new(move |key_id, _| {
            locate(&ks, key_id, fallback.as_deref())?
                .secret()
                .map(|s| s.to_vec())
                .ok_or_else(|| cose::Error::KeyLocator("not a secret".to_string()))
        });
        Decrypter::new(recovery)
            .with_tag_policy(policy(args.allow_tag), report("tag"))
            .with_custom_data_policy(policy(args.allow_custom_data), report("custom data"))
            .decrypt(&envelope)?
    };

    write_out(&plain_text, args.output.as_deref())
}

fn sign(args: &SignArgs) -> Result<(), Box<dyn Error>> {
    let ks = load_keystore(&args.keystore)?;
    let entry = lookup(&ks, &args.key_id)?;
    let object = read_cbor(&args.input, args.input_format, DecodeOptions::default())?;
    let label = CborValue::from_diagnostic(&args.label)?;

    let signed = match HmacAlgorithm::from_name(&args.algorithm) {
        Ok(algorithm) => {
            let secret = entry
                .secret()
                .ok_or_else(|| format!("key {} is not a secret", args.key_id))?;
            let mut s = Signer::new(HmacSigner::new(algorithm, secret.to_vec()));
            if !args.anonymous {
                s = s.with_key_id(args.key_id.as_str());
            }
            s.sign(label, object)?
        }
        Err(_) => {
            let algorithm = AsymSignatureAlgorithm::from_name(&args.algorithm)?;
            let private_key = entry
                .private_key()
                .ok_or_else(|| format!("key {} is not a private key", args.key_id))?;
            let provider =
                AsymSigner::new(algorithm, private_key.clone())?.with_public_key(args.public_key);
            let mut s = Signer::new(provider);
            if !args.anonymous {
                s = s.with_key_id(args.key_id.as_str());
            }
            s.sign(label, object)?
        }
    };

    write_cbor(&signed, args.output.as_deref(), args.format)
}

fn verify(args: &VerifyArgs) -> Result<(), Box<dyn Error>> {
    let ks = load_keystore(&args.keystore)?;
    let object = read_cbor(&args.input, args.format, DecodeOptions::default())?;
    let label = CborValue::from_diagnostic(&args.label)?;

    let algorithm = container(&object)
        .and_then(|m| m.get(&label).ok())
        .and_then(|s| s.as_map().ok())
        .and_then(|s| s.get(cose::constants::ALGORITHM_LABEL).ok())
        .and_then(|a| a.as_int().ok())
        .ok_or("no signature object found")?;

    let fallback = args.key_id.clone();
    if HmacAlgorithm::from_id(algorithm).is_ok() {
        let verifier = HmacVerifier::new(move |key_id, _| {
            locate(&ks, key_id, fallback.as_deref())?
                .secret()
                .map(|s| s.to_vec())
                .ok_or_else(|| cose::Error::KeyLocator("not a secret".to_string()))
        });
        Validator::new(verifier)
            .with_tag_policy(policy(args.allow_tag), report("tag"))
            .with_custom_data_policy(policy(args.allow_custom_data), report("custom data"))
            .validate(label, &object)?;
    } else {
        let verifier = AsymVerifier::new(move |embedded, key_id, _| {
            if let (Some(k), None, None) = (embedded, key_id, &fallback) {
                return Ok(k.clone());
            }
            locate(&ks, key_id, fallback.as_deref())?
                .public_key()
                .map_err(|e| cose::Error::KeyLocator(e.to_string()))?
                .ok_or_else(|| cose::Error::KeyLocator("no public key".to_string()))
        });
        Validator::new(verifier)
            .with_tag_policy(policy(args.allow_tag), report("tag"))
            .with_custom_data_policy(policy(args.allow_custom_data), report("custom data"))
            .validate(label, &object)?;
    }

    println!("signature valid");

    Ok(())
}
