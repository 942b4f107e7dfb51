use std::convert::TryInto;
use std::path::PathBuf;
use std::{env, fs};

const PASSWORD_SALT: &str = "password.salt";
const TOKEN_SECRET: &str = "token.secret";

pub type Salt = [u8; 16];

/// Secret material for password hashing and token signing. Loaded from
/// `SECURITY_DIR` on startup; missing files are generated and written back so
/// hashes and tokens survive restarts.
#[derive(Debug, Clone)]
pub struct Security {
    pub salt: Salt,
    pub token_secret: Vec<u8>,
}

#[inline]
fn security_dir() -> PathBuf {
    PathBuf::from(env::var("SECURITY_DIR").unwrap_or("./security".to_string()))
}

impl Security {
    pub fn load() -> Security {
        let dir = security_dir();

        fs::create_dir_all(dir.clone())
            .expect("unable to create directory for storing security information");

        tracing::info!("Loading password salt...");
        let mut salt: Option<Salt> = fs::read(dir.join(PASSWORD_SALT))
            .map(|s| s.try_into().ok())
            .ok()
            .flatten();

        match salt {
            None => {
                tracing::info!(
                    "Salt not found in '{}'. Generating a new password salt.",
                    dir.join(PASSWORD_SALT).display()
                );
                salt = Some(rand::random());

                fs::write(dir.join(PASSWORD_SALT), salt.unwrap()).expect("unable to write salt");
            }
            Some(_) => tracing::info!("Salt found and loaded."),
        }

        tracing::info!("Loading token signing secret...");
        let mut token_secret = fs::read(dir.join(TOKEN_SECRET)).unwrap_or_default();

        if token_secret.is_empty() {
            tracing::info!("Token secret empty or missing. Generating a new one.");

            token_secret = (0..64).map(|_| rand::random::<u8>()).collect();

            fs::write(dir.join(TOKEN_SECRET), token_secret.as_slice())
                .expect("unable to write token signing secret");
        } else {
            tracing::info!("Loaded token signing secret.");
        }

        Security {
            salt: salt.unwrap(),
            token_secret,
        }
    }

    /// Throwaway secrets for tests; nothing touches the filesystem.
    pub fn ephemeral() -> Security {
        Security {
            salt: rand::random(),
            token_secret: (0..64).map(|_| rand::random::<u8>()).collect(),
        }
    }
}
