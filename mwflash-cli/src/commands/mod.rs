//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod info;
pub(crate) mod upload;

use {
    crate::{PlanArgs, config::Config},
    anyhow::Result,
    mwflash::{DEFAULT_LOAD_ADDRESS, FixedDelay, TraversalOrder},
    std::{path::PathBuf, time::Duration},
};

/// Upload settings after merging CLI flags, config file and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlanSettings {
    pub firmware: PathBuf,
    pub load_address: u32,
    pub delay: Duration,
    pub order: TraversalOrder,
}

impl PlanSettings {
    /// Resolve settings; flags win over the config file.
    pub(crate) fn resolve(args: &PlanArgs, config: &Config) -> Result<Self> {
        let order = match args.order {
            Some(order) => order.into(),
            None => config
                .upload
                .traversal_order()?
                .unwrap_or_default(),
        };

        let delay = args
            .delay_ms
            .or(config.upload.delay_ms)
            .map_or(FixedDelay::DEFAULT_DELAY, Duration::from_millis);

        Ok(Self {
            firmware: args.firmware.clone(),
            load_address: args
                .address
                .or(config.upload.load_address)
                .unwrap_or(DEFAULT_LOAD_ADDRESS),
            delay,
            order,
        })
    }
}
