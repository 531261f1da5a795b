//! Optional physics plugins
//!
//! Each plugin is a set of stages spliced into the default stage lists by
//! name. A plugin is switched on by the presence of its configuration
//! section:
//! - `[thermal]`: explicit heat conduction with fixed top and bottom
//!   temperatures
//! - `[winkler]`: restoring pressure on the bottom surface

pub mod temperature;
pub mod winkler;

use log::debug;

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::pipeline::Pipeline;

pub use temperature::{AverageTemperature, HeatConduction, TemperatureConditions};
pub use winkler::WinklerForce;

/// Register the stages of every configured plugin.
///
/// # Errors
/// `Config` if a stage the plugin anchors to is missing from the list.
pub fn register(config: &SimulationConfig, pipeline: &mut Pipeline) -> Result<()> {
    if config.thermal.is_some() {
        temperature::register(pipeline)?;
        debug!("temperature plugin registered");
    }
    if config.winkler.is_some() {
        winkler::register(pipeline)?;
        debug!("winkler plugin registered");
    }
    Ok(())
}
