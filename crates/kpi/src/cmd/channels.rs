//! Channels command - Describe the channel registry
//!
//! # Usage
//!
//! ```bash
//! kpi channels
//! kpi channels google_ads_metrics
//! ```

use anyhow::Result;
use clap::Args;
use kpi_engine::Registry;
use kpi_engine::registry::{ChannelSelector, ChannelSpec};

/// Channels command arguments
#[derive(Args, Debug)]
pub struct ChannelsArgs {
    /// Display category to describe in detail
    #[arg(value_name = "DISPLAY_CATEGORY")]
    display_category: Option<String>,
}

/// Run the channels command
pub fn run(args: ChannelsArgs) -> Result<()> {
    let registry = Registry::standard();

    let Some(display_category) = args.display_category else {
        for channel in registry.channels() {
            println!("{:32} {:30} {}", channel.display_category, channel.id, channel.label);
        }
        let all = registry.all_channels();
        let members: Vec<&str> = all.members.iter().map(|c| c.id).collect();
        println!(
            "{:32} {:30} {}",
            kpi_engine::registry::ALL_CHANNELS_CATEGORY,
            kpi_engine::registry::ALL_CHANNELS_ID,
            members.join(", ")
        );
        return Ok(());
    };

    match registry.select(&display_category)? {
        ChannelSelector::Single(channel) => describe(&channel),
        ChannelSelector::All(all) => {
            println!("metrics:");
            for metric in &all.metrics {
                println!("  {}", metric);
            }
            println!("members:");
            for member in &all.members {
                println!("  {} ({})", member.id, member.label);
            }
        }
    }
    Ok(())
}

fn describe(channel: &ChannelSpec) {
    println!("{} ({})", channel.label, channel.id);

    println!("levels:");
    for level in &channel.levels {
        println!(
            "  {:12} {:32} id={}",
            level.object_type, level.type_alias, level.id_field
        );
    }

    println!("dimensions:");
    println!("  {:32} {}", "channel.name", channel.label);
    for dimension in &channel.dimensions {
        println!(
            "  {:32} {}",
            format!("{}.{}", dimension.object_type, dimension.property),
            dimension.field
        );
    }

    println!("metrics:");
    for metric in &channel.metrics {
        println!("  {}", metric.name);
    }
}
