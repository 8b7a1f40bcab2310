//! 🚀 zdx-cli — the front door, the bouncer, the maitre d' of zendex.
//!
//! 📦 This binary crate is the thin CLI wrapper that loads config, sets up
//! logging, and then lets the library do the actual reindexing. Like a
//! manager, but honest about it. 🦆

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🚀 main() — where it all begins.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Grab the config path from argv (or fall back to `zdx.toml`)
/// 3. Load config (the moment of truth)
/// 4. Run the sync (send it 🙏)
/// 5. Handle errors (peel, sniff, hint, exit 1)
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 Set up tracing — because println! debugging is a lifestyle choice
    // we're trying to move past, like flip phones and cargo shorts
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 🎯 One optional arg: the config file path
    let args: Vec<String> = std::env::args().collect();
    let path_arg = match args.get(1) {
        Some(s) => s.as_str(),
        None => "zdx.toml", // 🔧 default: the ol' reliable
    };

    // 🔒 Validate the config file exists before we get too emotionally attached
    let config_file = std::path::Path::new(path_arg);
    let config_file_if_it_actually_exists = match config_file
        .try_exists()
        .context(format!(
            "💀 Couldn't even check whether the configuration file exists. Permissions? A vanished \
             mount? Was checking here: '{}'",
            config_file.display()
        ))? {
        true => Some(config_file),
        false => None, // 💤 not there — env vars will have to carry the whole run
    };

    // 🔧 Load the config — the moment we find out if the TOML is valid or if
    // someone put a tab where a space should be (looking at you, Kevin)
    let app_config = zdx::app_config::load_config(config_file_if_it_actually_exists)
        .context("💀 Couldn't load the configuration. Check the file, check the ZDX_* env vars, check the obvious thing you already ruled out.")?;

    // 🚀 SEND IT. The alias won't swap itself.
    let result = zdx::run(app_config).await;

    match result {
        Ok(outcome) => {
            // ✅ Pop the champagne. Or at least close the tab with dignity. 🍾
            info!(
                "✅ synced {} document(s) into '{}' ({} stale generation(s) deleted)",
                outcome.documents,
                outcome.versioned_index,
                outcome.removed_indices.len()
            );
            Ok(())
        }
        Err(err) => {
            // 💀 Error handling: the part where we find out what went wrong
            // and print it in a way that's helpful at 3am
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
            let mut smells_like_connection_trouble = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                // -- 🕵️ sniff each cause like a truffle pig hunting for network problems
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                    || cause_str.contains("kept failing after")
                {
                    smells_like_connection_trouble = true;
                }
            }

            // -- 📡 if it smells like a connection problem, it's probably a connection problem
            if smells_like_connection_trouble {
                error!(
                    "🔧 hint: the search cluster doesn't look reachable. \
                    Double-check the engine URL and that the cluster is actually up. \
                    If you're using Docker, try `docker ps` to see what's running, \
                    or `docker compose up -d` to resurrect it. Even clusters need a nudge sometimes. ☕"
                );
            }

            // 🗑️ Exit with prejudice. Process exitus maximus.
            std::process::exit(1);
        }
    }
}
