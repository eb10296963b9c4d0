//! Identity seed generation

use anyhow::Result;
use courier_crypto::{Ed25519Signer, SigningCapability};
use rand::rngs::OsRng;

/// Print a fresh seed with its public key and address
pub fn run() -> Result<()> {
    let signer = Ed25519Signer::generate(&mut OsRng);
    let seed = signer.seed_hex();

    println!("[identity]");
    println!("secret_key = \"{}\"", seed.as_str());
    println!("# public_key = \"{}\"", hex::encode(signer.verifying_key()));
    println!("# address = \"{}\"", signer.address());
    eprintln!("Store the seed in COURIER_SECRET_KEY rather than in a committed file.");
    Ok(())
}
