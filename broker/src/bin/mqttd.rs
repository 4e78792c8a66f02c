// Copyright (c) 2020 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use mqttd::{config::Config, log as mqttd_log, Broker, Error};

#[derive(Parser, Debug)]
#[clap(name = "mqttd", about = "A minimal MQTT broker core")]
struct Cli {
    /// Path to a TOML config file. Defaults to an all-defaults config
    /// (0.0.0.0:1883) if omitted.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Overrides the listener port from the config file.
    #[clap(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }

    mqttd_log::init_log(config.log())?;

    let broker = Arc::new(Broker::new(&config));
    broker.start(&config).await
}
