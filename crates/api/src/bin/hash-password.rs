//! Password hashing utility for Tubeline
//!
//! Prints an Argon2id hash in the format the `users.password_hash` column
//! stores, for seeding accounts by hand.
//!
//! Usage:
//!   cargo run --bin hash-password
//!   cargo run --bin hash-password "correct horse battery staple"

use std::env;
use std::io::{self, Write};

use tubeline_api::auth::{hash_password, verify_password};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let password = match env::args().nth(1) {
        Some(pwd) => pwd,
        None => {
            // Read from stdin so the password stays out of the process list
            print!("Enter password to hash: ");
            io::stdout().flush()?;

            let mut password = String::new();
            io::stdin().read_line(&mut password)?;
            password.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    if password.trim().is_empty() {
        eprintln!("Error: Password cannot be empty");
        std::process::exit(1);
    }

    let hash = hash_password(&password)?;
    if !verify_password(&password, &hash)? {
        eprintln!("Error: Hash failed to verify");
        std::process::exit(1);
    }

    println!("{}", hash.as_str());
    eprintln!(
        "UPDATE users SET password_hash = '{}' WHERE username = '<username>';",
        hash.as_str()
    );

    Ok(())
}
