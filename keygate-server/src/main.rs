//! keygate server binary

use anyhow::Context;
use clap::{Arg, ArgAction, Command};
use keygate_core::{
    AccountId, AuthService, KeyRing, MemoryAccountStore, Permission, TokenLifetimes,
};
use keygate_server::{AccessGuard, AppContext, Credential, GuardConfig, Server};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_SEED_PASSWORD: &str = "change-me";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let matches = Command::new("keygate-server")
        .version("0.1.0")
        .about("First-party bearer/refresh token authentication service")
        .arg(
            Arg::new("bind")
                .long("bind")
                .value_name("ADDR")
                .help("Bind address")
                .default_value("127.0.0.1:3000"),
        )
        .arg(
            Arg::new("access-ttl")
                .long("access-ttl")
                .value_name("SECS")
                .help("Access token lifetime in seconds")
                .default_value("3600"),
        )
        .arg(
            Arg::new("refresh-ttl")
                .long("refresh-ttl")
                .value_name("SECS")
                .help("Refresh token lifetime in seconds")
                .default_value("86400"),
        )
        .arg(
            Arg::new("key-overlap")
                .long("key-overlap")
                .value_name("SECS")
                .help("Verification overlap after key rotation in seconds")
                .default_value("3600"),
        )
        .arg(
            Arg::new("allow-ip")
                .long("allow-ip")
                .value_name("IP")
                .help("Source address allowed to rotate the signing key (repeatable; none configured denies all)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("trust-forwarded-for")
                .long("trust-forwarded-for")
                .help("Resolve the caller address from X-Forwarded-For (only behind a sanitizing proxy)")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("seed-email")
                .long("seed-email")
                .value_name("EMAIL")
                .help("Email of the seeded demo account")
                .default_value("admin@example.com"),
        )
        .arg(
            Arg::new("seed-password")
                .long("seed-password")
                .value_name("PASSWORD")
                .help("Password of the seeded demo account")
                .default_value(DEFAULT_SEED_PASSWORD),
        )
        .get_matches();

    let bind_addr: SocketAddr = matches
        .get_one::<String>("bind")
        .unwrap()
        .parse()
        .context("invalid bind address")?;

    let access_ttl: u64 = matches
        .get_one::<String>("access-ttl")
        .unwrap()
        .parse()
        .context("invalid access token lifetime")?;
    let refresh_ttl: u64 = matches
        .get_one::<String>("refresh-ttl")
        .unwrap()
        .parse()
        .context("invalid refresh token lifetime")?;
    let key_overlap: u64 = matches
        .get_one::<String>("key-overlap")
        .unwrap()
        .parse()
        .context("invalid key overlap window")?;

    let rotate_allowlist: Vec<IpAddr> = matches
        .get_many::<String>("allow-ip")
        .unwrap_or_default()
        .map(|value| value.parse().context("invalid allowlist address"))
        .collect::<anyhow::Result<_>>()?;

    let seed_email = matches.get_one::<String>("seed-email").unwrap().clone();
    let seed_password = matches.get_one::<String>("seed-password").unwrap().clone();

    if seed_password == DEFAULT_SEED_PASSWORD {
        warn!("Running with the default seed password; pass --seed-password");
    }
    if rotate_allowlist.is_empty() {
        info!("No rotation allowlist configured; key rotation is disabled");
    }

    // Seed the demo account with a random revocation secret
    let store = Arc::new(MemoryAccountStore::new());
    let seed_id = AccountId::new(1);
    let secret: [u8; 32] = rand::random();
    store.upsert(seed_id, Permission::all(), &secret);

    let lifetimes = TokenLifetimes {
        access: Duration::from_secs(access_ttl),
        refresh: Duration::from_secs(refresh_ttl),
    };
    let service = Arc::new(AuthService::new(
        KeyRing::new(Duration::from_secs(key_overlap)),
        Arc::clone(&store),
        lifetimes,
    ));

    let guard = Arc::new(AccessGuard::new(
        Arc::clone(&service),
        GuardConfig {
            rotate_allowlist,
            trust_forwarded_for: matches.get_flag("trust-forwarded-for"),
        },
    ));

    let mut credentials = HashMap::new();
    credentials.insert(
        seed_email.clone(),
        Credential {
            password: seed_password,
            account: seed_id,
        },
    );

    info!("Seeded account {} as {}", seed_id, seed_email);

    let ctx = AppContext {
        service,
        guard,
        store,
        credentials: Arc::new(credentials),
    };

    Server::new(ctx)
        .serve(bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {}", e))?;

    info!("Server shutdown complete");
    Ok(())
}
