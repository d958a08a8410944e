// SPDX-License-Identifier: MIT
//! doctor.rs — pre-flight diagnostic checks for `liftd doctor`.
//!
//! This module is self-contained and does NOT require AppContext.
//! It runs before the daemon starts, so it can catch configuration
//! problems before they cause confusing startup failures.

use crate::classify::LinearClassifier;
use crate::config::DaemonConfig;

/// The result of a single diagnostic check.
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Run all diagnostic checks and return a list of results.
pub fn run_doctor(config: &DaemonConfig) -> Vec<CheckResult> {
    vec![
        check_port_available(config),
        check_data_dir_writable(config),
        check_model_artifact(config),
        check_threshold(config),
    ]
}

// ─── Individual checks ────────────────────────────────────────────────────────

/// Check 1: the configured port is available (not in use by another process).
fn check_port_available(config: &DaemonConfig) -> CheckResult {
    let bind = format!("{}:{}", config.bind_address, config.port);
    let passed = std::net::TcpListener::bind(&bind).is_ok();
    CheckResult {
        name: "Port available",
        passed,
        detail: if passed {
            format!("{bind} is free")
        } else {
            format!("{bind} is in use by another process")
        },
    }
}

/// Check 2: the data directory exists (or can be created) and is writable.
fn check_data_dir_writable(config: &DaemonConfig) -> CheckResult {
    let dir = &config.data_dir;
    let result = std::fs::create_dir_all(dir).and_then(|_| {
        let probe = dir.join(".liftd-doctor-probe");
        std::fs::write(&probe, b"ok")?;
        std::fs::remove_file(&probe)
    });
    match result {
        Ok(()) => CheckResult {
            name: "Data directory writable",
            passed: true,
            detail: dir.display().to_string(),
        },
        Err(e) => CheckResult {
            name: "Data directory writable",
            passed: false,
            detail: format!("{}: {e}", dir.display()),
        },
    }
}

/// Check 3: the model artifact loads, when one is configured.
fn check_model_artifact(config: &DaemonConfig) -> CheckResult {
    match &config.model_path {
        None => CheckResult {
            name: "Phase model",
            passed: true,
            detail: "no artifact configured — geometry heuristic will be used".to_string(),
        },
        Some(path) => match LinearClassifier::load(path) {
            Ok(_) => CheckResult {
                name: "Phase model",
                passed: true,
                detail: format!("{} loads cleanly", path.display()),
            },
            Err(e) => CheckResult {
                name: "Phase model",
                passed: false,
                detail: format!("{e:#}"),
            },
        },
    }
}

/// Check 4: the acceptance threshold is in (0, 1].
/// Config loading already clamps this; the check documents the live value.
fn check_threshold(config: &DaemonConfig) -> CheckResult {
    let t = config.detection.threshold;
    let passed = t > 0.0 && t <= 1.0;
    CheckResult {
        name: "Detection threshold",
        passed,
        detail: format!("threshold = {t}"),
    }
}

/// Print results in the `liftd doctor` terminal format.
pub fn print_doctor_results(results: &[CheckResult]) {
    println!("liftd doctor\n");
    for r in results {
        let mark = if r.passed { "✓" } else { "✗" };
        println!("  {mark} {:<24} {}", r.name, r.detail);
    }
    let failed = results.iter().filter(|r| !r.passed).count();
    println!();
    if failed == 0 {
        println!("All checks passed.");
    } else {
        println!("{failed} check(s) failed.");
    }
}
