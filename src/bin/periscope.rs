// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stand-alone entrypoint for the proxy.
//!
//!  Configuration comes from `PERISCOPE_CONFIG_FILE`, then from
//!  /etc/periscope/config.toml when that exists, and otherwise from
//!  environment variables and built-in defaults alone.

use periscope::{Periscope, error_fmt, info_fmt};
use std::env;
use std::error::Error;
use std::path::Path;

/// The config file to load: the env override first, then the path baked
/// into the container image.
fn config_file() -> Option<String> {
    if let Ok(path) = env::var("PERISCOPE_CONFIG_FILE") {
        return Some(path);
    }

    let baked_in = "/etc/periscope/config.toml";
    Path::new(baked_in).exists().then(|| baked_in.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // println rather than log: logging is not configured until the loader
    // has run.
    println!("Starting Periscope");

    let mut loader = Periscope::loader().with_env_vars();
    match config_file() {
        Some(path) => {
            println!("Using configuration from {path}");
            loader = loader.with_config_file(&path);
        }
        None => println!("No configuration file found; using environment variables and defaults"),
    }

    let proxy = match loader.build().await {
        Ok(proxy) => proxy,
        Err(e) => {
            println!("Failed to build proxy: {e}");
            return Err(e.into());
        }
    };

    match proxy.start().await {
        Ok(()) => info_fmt!("Periscope", "Proxy server stopped gracefully"),
        Err(e) => {
            error_fmt!("Periscope", "Proxy server failed: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
