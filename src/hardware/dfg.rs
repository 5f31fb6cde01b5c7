//! DFG (difference frequency generation) stage.

use super::types::{Beam, ConversionStatus, ShutterAction, StartStop, Switch};
use super::Module;
use crate::error::Result;
use crate::protocol::{Args, Connection, ModuleKind, Reply};

/// DFG facade.
pub struct Dfg {
    conn: Connection,
}

super::facade!(Dfg, ModuleKind::Dfg);

impl Dfg {
    /// Tune `beam` to `target_nm`.
    pub async fn wavelength(&self, beam: Beam, target_nm: f64) -> Result<Reply> {
        let args = Args::new().with("beam", beam).with("target", target_nm);
        self.invoke("wavelength", &args).await
    }

    /// Stop wavelength tuning.
    pub async fn wavelength_stop(&self) -> Result<Reply> {
        self.invoke("wavelength_stop", &Args::new()).await
    }

    /// Stage status.
    pub async fn status(&self) -> Result<ConversionStatus> {
        ConversionStatus::from_reply(&self.invoke("status", &Args::new()).await?)
    }

    /// Switch the pump laser.
    pub async fn laser_control(&self, action: Switch) -> Result<Reply> {
        self.invoke("laser_control", &Args::new().with("action", action))
            .await
    }

    /// Open or close the pump shutter.
    pub async fn shutter_control(&self, action: ShutterAction) -> Result<Reply> {
        self.invoke("shutter_control", &Args::new().with("action", action))
            .await
    }

    /// Start or stop automatic PBA.
    pub async fn pba_control(&self, action: StartStop) -> Result<Reply> {
        self.invoke("pba_control", &Args::new().with("action", action))
            .await
    }

    /// Start or stop the PBA reference; `solstis` (1 or 2) applies to start.
    pub async fn pba_reference(&self, action: StartStop, solstis: Option<i64>) -> Result<Reply> {
        let mut args = Args::new().with("action", action);
        if let Some(solstis) = solstis {
            args.set("solstis", solstis);
        }
        self.invoke("pba_reference", &args).await
    }

    /// Shut the PPLN oven down for change over.
    pub async fn change_ppln(&self) -> Result<Reply> {
        self.invoke("change_ppln", &Args::new()).await
    }

    /// Start the PPLN oven after change over with oven `fitted_oven` (1 to 3).
    pub async fn start_ppln(&self, fitted_oven: i64) -> Result<Reply> {
        self.invoke("start_ppln", &Args::new().with("fitted_oven", fitted_oven))
            .await
    }

    /// Optimise the PPLN position for maximum output.
    pub async fn optimise_ppln(&self) -> Result<Reply> {
        self.invoke("optimise_ppln", &Args::new()).await
    }
}
