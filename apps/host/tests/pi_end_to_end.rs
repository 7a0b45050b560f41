//! Exercises the orchestrator end-to-end against an in-process fake plugin
//! (no `dlopen`): a handful of Monte-Carlo pi events, checked for full
//! persistence and for checkpoint-resume idempotence.

use std::ffi::c_void;
use std::path::PathBuf;
use std::sync::Arc;

use hpcsim_host::config::Cli;
use hpcsim_host::runtime::Runtime;
use hpcsim_plugin::abi::RawResult;
use hpcsim_plugin::{PluginHost, PluginVTable, QueueResult, RandU01};

unsafe extern "C" fn fake_event_run(_ctx: *mut c_void) -> i32 {
    let mut inside = 0.0f64;
    let mut total = 0.0f64;
    for _ in 0..1000u64 {
        let x = RandU01();
        let y = RandU01();
        total += 1.0;
        if x * x + y * y < 1.0 {
            inside += 1.0;
        }
    }
    let mut result = RawResult {
        id: [0u8; 48],
        length: 16,
        payload: [0u8; 2048],
    };
    result.payload[0..8].copy_from_slice(&total.to_ne_bytes());
    result.payload[8..16].copy_from_slice(&inside.to_ne_bytes());
    QueueResult(&result);
    0
}

fn fake_plugin() -> Arc<PluginHost> {
    let vtable = PluginVTable {
        simulation_init: None,
        run_init: None,
        pilot_init: None,
        event_init: None,
        event_run: fake_event_run,
        event_clear: None,
        pilot_clear: None,
        reduce_result: None,
        run_clear: None,
        simulation_unload: None,
    };
    Arc::new(PluginHost::from_vtable(vtable))
}

fn base_cli(output: PathBuf, events: u64, checkpoint: bool) -> Cli {
    Cli {
        simulation: PathBuf::new(),
        threads: "2".parse().unwrap(),
        events,
        first: 0,
        output,
        checkpoint,
        pilot: false,
    }
}

#[test]
fn runs_all_events_and_persists_one_record_each() {
    let path = std::env::temp_dir().join(format!("hpcsim-host-it-{}", std::process::id()));
    let _ = std::fs::remove_file(&path);

    Runtime::new(base_cli(path.clone(), 20, false))
        .run_with_plugin(fake_plugin())
        .unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let mut offset = 0usize;
    let mut count = 0usize;
    while offset < bytes.len() {
        let (_record, consumed) = hpcsim_record::ResultRecord::decode(&bytes[offset..]).unwrap();
        offset += consumed;
        count += 1;
    }
    assert_eq!(count, 20);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn rerun_without_checkpoint_truncates_rather_than_appends() {
    let path = std::env::temp_dir().join(format!("hpcsim-host-it-truncate-{}", std::process::id()));
    let _ = std::fs::remove_file(&path);

    Runtime::new(base_cli(path.clone(), 15, false))
        .run_with_plugin(fake_plugin())
        .unwrap();
    let first_len = std::fs::metadata(&path).unwrap().len();

    Runtime::new(base_cli(path.clone(), 15, false))
        .run_with_plugin(fake_plugin())
        .unwrap();
    let second_len = std::fs::metadata(&path).unwrap().len();

    assert_eq!(first_len, second_len, "a non-checkpointed rerun must truncate, not append");
    let _ = std::fs::remove_file(&path);
}

#[test]
fn pilot_mode_runs_all_events_and_persists_one_record_each() {
    let path = std::env::temp_dir().join(format!("hpcsim-host-it-pilot-{}", std::process::id()));
    let _ = std::fs::remove_file(&path);

    let mut cli = base_cli(path.clone(), 17, false);
    cli.pilot = true;
    cli.threads = "4".parse().unwrap();

    Runtime::new(cli).run_with_plugin(fake_plugin()).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let mut offset = 0usize;
    let mut count = 0usize;
    while offset < bytes.len() {
        let (_record, consumed) = hpcsim_record::ResultRecord::decode(&bytes[offset..]).unwrap();
        offset += consumed;
        count += 1;
    }
    assert_eq!(count, 17);
    let _ = std::fs::remove_file(&path);
}

#[test]
fn checkpoint_resume_does_not_duplicate_completed_events() {
    let path = std::env::temp_dir().join(format!("hpcsim-host-it-resume-{}", std::process::id()));
    let _ = std::fs::remove_file(&path);

    Runtime::new(base_cli(path.clone(), 10, true))
        .run_with_plugin(fake_plugin())
        .unwrap();
    let first_len = std::fs::metadata(&path).unwrap().len();

    Runtime::new(base_cli(path.clone(), 10, true))
        .run_with_plugin(fake_plugin())
        .unwrap();
    let second_len = std::fs::metadata(&path).unwrap().len();

    assert_eq!(first_len, second_len, "resumed run must not duplicate any records");
    let _ = std::fs::remove_file(&path);
}
