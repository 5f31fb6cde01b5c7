//! SFG (sum frequency generation) stage.

use super::types::{Beam, ConversionStatus, StartStop, TeraScanKind, TeraScanOutput, TeraScanSetup, TeraScanStatus};
use super::Module;
use crate::error::Result;
use crate::protocol::{Args, Connection, ModuleKind, Reply};

/// SFG facade.
pub struct Sfg {
    conn: Connection,
}

super::facade!(Sfg, ModuleKind::Sfg);

impl Sfg {
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

    /// Configure a TeraScan. Units go out without the `/s` suffix.
    pub async fn scan_stitch_initialise(&self, setup: &TeraScanSetup) -> Result<Reply> {
        let args = Args::new()
            .with("scan", setup.scan)
            .with("start", setup.start_nm)
            .with("stop", setup.stop_nm)
            .with("rate", setup.rate)
            .with("units", setup.units.stage_word());
        self.invoke("scan_stitch_initialise", &args).await
    }

    /// Start or stop a TeraScan.
    pub async fn scan_stitch_op(&self, kind: TeraScanKind, op: StartStop) -> Result<Reply> {
        let args = Args::new().with("scan", kind).with("operation", op);
        self.invoke("scan_stitch_op", &args).await
    }

    /// TeraScan progress.
    pub async fn scan_stitch_status(&self, kind: TeraScanKind) -> Result<TeraScanStatus> {
        let reply = self
            .invoke("scan_stitch_status", &Args::new().with("scan", kind))
            .await?;
        TeraScanStatus::from_reply(&reply)
    }

    /// Configure `automatic_output` telemetry; delay and update are in 1/100 s.
    pub async fn terascan_output(&self, output: &TeraScanOutput) -> Result<Reply> {
        let args = Args::new()
            .with("operation", output.operation)
            .with("delay", output.delay)
            .with("update", output.update)
            .with("pause", output.pause);
        self.invoke("terascan_output", &args).await
    }

    /// Resume a paused TeraScan.
    pub async fn terascan_continue(&self) -> Result<Reply> {
        self.invoke("terascan_continue", &Args::new()).await
    }

    /// Every ADC channel of the EMM.
    pub async fn emm_read_all_adc(&self) -> Result<Reply> {
        self.invoke("emm_read_all_adc", &Args::new()).await
    }
}
