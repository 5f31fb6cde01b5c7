//! Typed module facades and the laser system aggregate against simulated modules.

use chrono::NaiveDate;
use msquared_daq::config::MsquaredConfig;
use msquared_daq::error::IceBlocError;
use msquared_daq::hardware::mock::{Response, SimulatedIceBloc};
use msquared_daq::hardware::types::{
    Beam, EquinoxOperation, LockCondition, ScanRateUnits, StartStop, TeraScanKind, TeraScanSetup,
};
use msquared_daq::hardware::{AnyModule, Dfg, Equinox, LaserSystem, Module, Sfg, Solstis};
use msquared_daq::protocol::codec::{Envelope, Parameters};
use msquared_daq::protocol::{Args, CallOptions, ModuleKind};
use serde_json::{json, Value};
use std::time::Duration;

fn bag(value: Value) -> Parameters {
    match value {
        Value::Object(map) => map,
        _ => Parameters::new(),
    }
}

fn options() -> CallOptions {
    CallOptions {
        read_timeout: Some(Duration::from_secs(2)),
        ..CallOptions::default()
    }
}

fn param<'a>(request: &'a Envelope, name: &str) -> &'a Value {
    &request.parameters.as_ref().unwrap()[name]
}

// =============================================================================
// Shared Module Operations
// =============================================================================

#[tokio::test]
async fn start_link_and_ping() {
    let sim = SimulatedIceBloc::start().await.unwrap();
    let solstis = Solstis::connect("127.0.0.1", sim.port(), options()).await.unwrap();

    let link = solstis.start_link("192.168.1.108").await.unwrap();
    assert_eq!(link.text("status").unwrap(), "ok");
    assert_eq!(solstis.ping("Hello World").await.unwrap(), "hELLO wORLD");

    let requests = sim.requests();
    assert_eq!(requests[0].op, "start_link");
    assert_eq!(requests[0].id(), Some(900));
    assert_eq!(param(&requests[0], "ip_address"), &json!("192.168.1.108"));
    assert_eq!(requests[1].id(), Some(901));
}

#[tokio::test]
async fn unknown_operation_sends_nothing() {
    let sim = SimulatedIceBloc::start().await.unwrap();
    let solstis = Solstis::connect("127.0.0.1", sim.port(), options()).await.unwrap();

    let err = solstis.invoke("laser_status", &Args::new()).await.unwrap_err();
    assert!(matches!(err, IceBlocError::UnknownOperation { .. }), "unexpected {err:?}");
    assert!(sim.requests().is_empty());
}

#[tokio::test]
async fn invalid_arguments_send_nothing() {
    let sim = SimulatedIceBloc::start().await.unwrap();
    let solstis = Solstis::connect("127.0.0.1", sim.port(), options()).await.unwrap();

    let missing = solstis.invoke("set_wave_m", &Args::new()).await.unwrap_err();
    assert!(matches!(missing, IceBlocError::InvalidArgument { .. }), "unexpected {missing:?}");

    let wrong_kind = solstis
        .invoke("set_wave_m", &Args::new().with("wavelength", "far red"))
        .await
        .unwrap_err();
    assert!(matches!(wrong_kind, IceBlocError::InvalidArgument { .. }));

    assert!(sim.requests().is_empty());
}

#[tokio::test]
async fn any_module_dispatches_by_kind() {
    let sim = SimulatedIceBloc::start().await.unwrap();
    let conn = msquared_daq::Connection::open("127.0.0.1", sim.port(), options())
        .await
        .unwrap();

    let any = AnyModule::from_connection(ModuleKind::Equinox, conn);
    assert!(matches!(any, AnyModule::Equinox(_)));
    let module = any.as_module();
    assert_eq!(module.kind(), ModuleKind::Equinox);
    assert_eq!(module.ping("abc").await.unwrap(), "ABC");
    module.close().await;
}

// =============================================================================
// SolsTiS
// =============================================================================

#[tokio::test]
async fn solstis_status_is_decoded() {
    let sim = SimulatedIceBloc::with_responder(|request: &Envelope| match request.op.as_str() {
        "get_status" => Response::json(json!({
            "status": [0],
            "wavelength": [780.123],
            "temperature": [23.5],
            "temperature_status": "on",
            "etalon_lock": "on",
            "etalon_voltage": [98.2],
            "cavity_lock": "off",
            "resonator_voltage": [45.0],
            "ecd_lock": "not_fitted",
            "ecd_voltage": "not fitted",
            "output_monitor": [1.2],
            "etalon_pd_dc": [0.4],
            "dither": "off"
        })),
        _ => Response::status(0),
    })
    .await
    .unwrap();
    let solstis = Solstis::connect("127.0.0.1", sim.port(), options()).await.unwrap();

    let status = solstis.get_status().await.unwrap();
    assert!((status.wavelength_nm - 780.123).abs() < 1e-9);
    assert!(status.temperature_control);
    assert!(status.etalon_lock.is_locked());
    assert_eq!(status.cavity_lock, LockCondition::Off);
    assert_eq!(status.ecd_voltage, None);
    assert!(!status.dither);
}

#[tokio::test]
async fn tune_and_wait_returns_the_final_report() {
    let sim = SimulatedIceBloc::with_responder(|request: &Envelope| match request.op.as_str() {
        "set_wave_m" => Response::Sequence(vec![
            Response::json(json!({"status": [0], "wavelength": [785.0]})),
            Response::Delayed(
                Duration::from_millis(100),
                Box::new(Response::Envelope(Envelope::new(
                    1,
                    "set_wave_m_f_r",
                    Some(bag(json!({"status": [0], "wavelength": [785.0], "report": [0]}))),
                ))),
            ),
        ]),
        _ => Response::status(0),
    })
    .await
    .unwrap();
    let solstis = Solstis::connect("127.0.0.1", sim.port(), options()).await.unwrap();

    let report = solstis
        .tune_and_wait(785.0, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(report.op, "set_wave_m");
    assert!(!report.failed);

    let request = &sim.requests()[0];
    assert_eq!(request.id(), Some(1));
    assert_eq!(param(request, "wavelength"), &json!([785.0]));
    assert_eq!(param(request, "report"), &json!("finished"));
}

#[tokio::test]
async fn failed_final_report_is_a_device_error() {
    let sim = SimulatedIceBloc::with_responder(|request: &Envelope| match request.op.as_str() {
        "set_wave_m" => Response::Sequence(vec![
            Response::status(0),
            Response::Envelope(Envelope::new(
                1,
                "set_wave_m_f_r",
                Some(bag(json!({"status": [1], "report": [1]}))),
            )),
        ]),
        _ => Response::status(0),
    })
    .await
    .unwrap();
    let solstis = Solstis::connect("127.0.0.1", sim.port(), options()).await.unwrap();

    let err = solstis
        .tune_and_wait(785.0, Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(err, IceBlocError::Device { .. }), "unexpected {err:?}");
}

#[tokio::test]
async fn missing_final_report_times_out() {
    let sim = SimulatedIceBloc::start().await.unwrap();
    let solstis = Solstis::connect("127.0.0.1", sim.port(), options()).await.unwrap();

    let err = solstis
        .tune_and_wait(785.0, Duration::from_millis(200))
        .await
        .unwrap_err();
    assert!(err.is_timeout(), "unexpected {err:?}");
}

#[tokio::test]
async fn set_time_sends_the_clock_fields() {
    let sim = SimulatedIceBloc::start().await.unwrap();
    let solstis = Solstis::connect("127.0.0.1", sim.port(), options()).await.unwrap();

    let when = NaiveDate::from_ymd_opt(2026, 3, 14)
        .unwrap()
        .and_hms_opt(15, 9, 26)
        .unwrap();
    solstis.set_time(when).await.unwrap();

    let request = &sim.requests()[0];
    assert_eq!(request.op, "set_time");
    assert_eq!(request.id(), Some(55));
    assert_eq!(param(request, "hour"), &json!([15]));
    assert_eq!(param(request, "second"), &json!([26]));
    assert_eq!(param(request, "year"), &json!([26]));
}

// =============================================================================
// Equinox
// =============================================================================

#[tokio::test]
async fn equinox_control_failure_is_described() {
    let sim = SimulatedIceBloc::with_responder(|request: &Envelope| match request.op.as_str() {
        "laser_control" => Response::status(3),
        _ => Response::status(0),
    })
    .await
    .unwrap();
    let equinox = Equinox::connect("127.0.0.1", sim.port(), options()).await.unwrap();

    let err = equinox
        .laser_control(EquinoxOperation::Start)
        .await
        .unwrap_err();
    assert!(matches!(err, IceBlocError::Device { .. }));
    assert!(err.to_string().contains("not warmed up"), "{err}");
    assert_eq!(param(&sim.requests()[0], "operation"), &json!("start"));
}

#[tokio::test]
async fn equinox_status_is_decoded() {
    let sim = SimulatedIceBloc::with_responder(|request: &Envelope| match request.op.as_str() {
        "laser_status" => Response::json(json!({
            "emission_status": "on",
            "interlock_status": "closed",
            "shutter_status": "open",
            "set_power": [12.5],
            "current_operation": "none",
            "warm_up_complete": "yes",
            "fault_condition": "none"
        })),
        _ => Response::status(0),
    })
    .await
    .unwrap();
    let equinox = Equinox::connect("127.0.0.1", sim.port(), options()).await.unwrap();

    let status = equinox.laser_status().await.unwrap();
    assert!(status.is_emitting());
    assert!(status.is_fault_free());
    assert!(status.interlock_closed);
    assert_eq!(status.time_remaining_s, None);
}

// =============================================================================
// Conversion Stages
// =============================================================================

#[tokio::test]
async fn sfg_terascan_setup_uses_stage_units() {
    let sim = SimulatedIceBloc::start().await.unwrap();
    let sfg = Sfg::connect("127.0.0.1", sim.port(), options()).await.unwrap();

    let setup = TeraScanSetup {
        scan: TeraScanKind::Medium,
        start_nm: 500.0,
        stop_nm: 510.0,
        rate: 10.0,
        units: ScanRateUnits::GhzPerSecond,
    };
    sfg.scan_stitch_initialise(&setup).await.unwrap();
    sfg.wavelength(Beam::Visible, 540.0).await.unwrap();

    let requests = sim.requests();
    assert_eq!(requests[0].op, "scan_stitch_initialise");
    assert_eq!(requests[0].id(), Some(6));
    assert_eq!(param(&requests[0], "units"), &json!("GHz"));
    assert_eq!(param(&requests[0], "scan"), &json!("medium"));
    assert_eq!(param(&requests[0], "start"), &json!([500.0]));
    assert_eq!(param(&requests[1], "beam"), &json!("visible"));
    assert_eq!(param(&requests[1], "target"), &json!([540.0]));
}

#[tokio::test]
async fn dfg_operations_use_stage_ids() {
    let sim = SimulatedIceBloc::start().await.unwrap();
    let dfg = Dfg::connect("127.0.0.1", sim.port(), options()).await.unwrap();

    dfg.optimise_ppln().await.unwrap();
    dfg.pba_reference(StartStop::Start, Some(2)).await.unwrap();

    let requests = sim.requests();
    assert_eq!(requests[0].op, "optimise_ppln");
    assert_eq!(requests[0].id(), Some(10));
    assert!(requests[0].parameters.is_none());
    assert_eq!(requests[1].id(), Some(7));
    assert_eq!(param(&requests[1], "solstis"), &json!([2]));
}

// =============================================================================
// Laser System
// =============================================================================

#[tokio::test]
async fn laser_system_links_every_enabled_module() {
    let seed = SimulatedIceBloc::start().await.unwrap();
    let pump = SimulatedIceBloc::start().await.unwrap();

    let mut config = MsquaredConfig::default();
    config.application.client_ip = "10.0.0.5".to_string();
    config.modules.solstis.host = Some("127.0.0.1".to_string());
    config.modules.solstis.port = Some(seed.port());
    config.modules.equinox.host = Some("127.0.0.1".to_string());
    config.modules.equinox.port = Some(pump.port());
    config.modules.sfg.enabled = false;
    config.modules.dfg.enabled = false;
    config.protocol.read_timeout_ms = 2000;

    let system = LaserSystem::connect(&config).await.unwrap();
    assert_eq!(system.kinds(), vec![ModuleKind::Solstis, ModuleKind::Equinox]);
    assert!(system.solstis().is_some());
    assert!(system.sfg().is_none());

    system.start_link_all().await.unwrap();
    for sim in [&seed, &pump] {
        let requests = sim.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].op, "start_link");
        assert_eq!(param(&requests[0], "ip_address"), &json!("10.0.0.5"));
    }

    let pinged = system
        .module(ModuleKind::Equinox)
        .unwrap()
        .ping("Pump")
        .await
        .unwrap();
    assert_eq!(pinged, "pUMP");
    system.close().await;
}

#[tokio::test]
async fn laser_system_reports_unreachable_module() {
    let mut config = MsquaredConfig::default();
    config.modules.equinox.enabled = false;
    config.modules.sfg.enabled = false;
    config.modules.dfg.enabled = false;
    config.modules.solstis.host = Some("127.0.0.1".to_string());
    // bound then released, so nothing listens there
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    config.modules.solstis.port = Some(port);

    let err = LaserSystem::connect(&config).await.err().unwrap();
    assert!(matches!(err, IceBlocError::Connection { .. }), "unexpected {err:?}");
}
