//! Transient scenarios: oscillation, breakpoints and step control.

use std::ops::ControlFlow;

use approx::assert_relative_eq;
use nodal_core::components::{Capacitor, Inductor, Resistor, StepSource, VoltageSource};
use nodal_core::solver::Method;
use nodal_core::{Circuit, Simulator, TimeConfig};

fn rc(source: StepSource) -> Circuit {
    let mut circuit = Circuit::new();
    circuit
        .add(source)
        .add(Resistor::new("R1", "in", "out", 1e3))
        .add(Capacitor::new("C1", "out", "0", 1e-6));
    circuit
}

/// Times of the sign changes of `samples`, linearly interpolated.
fn zero_crossings(samples: &[(f64, f64)]) -> Vec<f64> {
    samples
        .windows(2)
        .filter(|w| w[0].1 * w[1].1 < 0.0)
        .map(|w| {
            let (t0, v0) = w[0];
            let (t1, v1) = w[1];
            t0 - v0 * (t1 - t0) / (v1 - v0)
        })
        .collect()
}

#[test]
fn test_lc_tank_keeps_its_frequency() {
    let inductance: f64 = 1e-6;
    let capacitance: f64 = 1e-3;
    let period = 2.0 * std::f64::consts::PI * (inductance * capacitance).sqrt();

    let mut circuit = Circuit::new();
    circuit
        .add(Inductor::new("L1", "a", "0", inductance).with_initial_condition(1e-3))
        .add(Capacitor::new("C1", "a", "0", capacitance));

    let config = TimeConfig::new(period / 200.0, 3.2 * period)
        .with_method(Method::Trapezoidal)
        .with_use_ic(true);
    let mut sim = Simulator::new(circuit).unwrap();
    let mut samples = Vec::new();
    sim.run_transient(config, |data| {
        samples.push((data.time, data.value("a").unwrap()));
        ControlFlow::Continue(())
    })
    .unwrap();

    let crossings = zero_crossings(&samples);
    assert!(crossings.len() >= 5, "only {} crossings", crossings.len());
    let first = crossings[0];
    let last = crossings[crossings.len() - 1];
    let measured = 2.0 * (last - first) / (crossings.len() - 1) as f64;
    assert_relative_eq!(measured, period, max_relative = 1e-3);

    // Peak voltage is I * sqrt(L / C); the trapezoidal rule does not damp it.
    let peak = samples
        .iter()
        .skip(samples.len() / 2)
        .map(|(_, v)| v.abs())
        .fold(0.0, f64::max);
    assert_relative_eq!(peak, 1e-3 * (inductance / capacitance).sqrt(), max_relative = 1e-2);
}

#[test]
fn test_breakpoints_are_hit_exactly() {
    let delay = 1e-3;
    let rise = 1e-4;
    let source = StepSource::new("V1", "in", "0", 0.0, 1.0).with_timing(delay, rise);
    let config = TimeConfig::new(1e-5, 3e-3);
    let max_step = config.effective_max_step();

    let mut sim = Simulator::new(rc(source)).unwrap();
    let mut times = Vec::new();
    sim.run_transient(config, |data| {
        times.push(data.time);
        ControlFlow::Continue(())
    })
    .unwrap();

    for corner in [delay, delay + rise, 3e-3] {
        let index = times
            .iter()
            .position(|&t| t == corner)
            .unwrap_or_else(|| panic!("breakpoint {corner} missed"));
        if let Some(&next) = times.get(index + 1) {
            assert!(next - corner <= 0.1 * max_step * (1.0 + 1e-9));
        }
    }
    assert!(times.windows(2).all(|w| w[1] > w[0]));
}

#[test]
fn test_step_source_drives_the_output() {
    let source = StepSource::new("V1", "in", "0", 0.0, 1.0).with_timing(1e-4, 1e-5);
    let mut sim = Simulator::new(rc(source)).unwrap();
    let mut transient = sim.transient(TimeConfig::new(1e-5, 2e-3)).unwrap();
    assert_relative_eq!(transient.value("out").unwrap(), 0.0);

    while !transient.is_finished() {
        transient.step().unwrap();
    }
    // Almost two time constants after the step.
    let expected = 1.0 - (-(2e-3 - 1.05e-4) / 1e-3f64).exp();
    assert_relative_eq!(transient.value("out").unwrap(), expected, max_relative = 1e-2);
}

#[test]
fn test_large_step_is_rejected_until_small_enough() {
    let mut circuit = Circuit::new();
    circuit
        .add(VoltageSource::new("V1", "in", "0", 1.0))
        .add(Resistor::new("R1", "in", "out", 1e3))
        .add(Capacitor::new("C1", "out", "0", 1e-6).with_initial_condition(0.0));

    let mut sim = Simulator::new(circuit).unwrap();
    let mut transient = sim
        .transient(TimeConfig::new(1e-5, 1e-2).with_use_ic(true))
        .unwrap();
    for _ in 0..3 {
        transient.step().unwrap();
    }

    let rejected_before = transient.statistics().rejected;
    let mut delta = 2e-3;
    transient.method_mut().set_delta(delta);
    let mut rejections = 0;
    loop {
        let used = transient.probe(delta);
        transient.correct().unwrap();
        let evaluation = transient.evaluate().unwrap();
        if evaluation.accepted {
            transient.accept().unwrap();
            break;
        }
        assert!(evaluation.delta < used, "{} >= {}", evaluation.delta, used);
        delta = evaluation.delta;
        rejections += 1;
    }

    assert!(rejections >= 1);
    assert_eq!(transient.statistics().rejected - rejected_before, rejections);
}

#[test]
fn test_oversized_first_step_is_accepted_then_corrected() {
    let mut circuit = Circuit::new();
    circuit
        .add(VoltageSource::new("V1", "in", "0", 1.0))
        .add(Resistor::new("R1", "in", "out", 1e3))
        .add(Capacitor::new("C1", "out", "0", 1e-6).with_initial_condition(0.0));

    let config = TimeConfig::new(1e-5, 1e-2).with_use_ic(true);
    let max_step = config.effective_max_step();
    let mut sim = Simulator::new(circuit).unwrap();
    let mut transient = sim.transient(config).unwrap();

    // The first point has no history to estimate an error from.
    transient.method_mut().set_delta(2e-3);
    transient.step().unwrap();
    assert_relative_eq!(transient.time(), 2e-3);
    assert_eq!(transient.statistics().rejected, 0);
    assert!(transient.method().delta() <= max_step);

    // The same step from there is rejected and retried smaller.
    let mut delta = 2e-3;
    let mut rejections = 0;
    loop {
        let used = transient.probe(delta);
        transient.correct().unwrap();
        let evaluation = transient.evaluate().unwrap();
        if evaluation.accepted {
            transient.accept().unwrap();
            break;
        }
        assert!(evaluation.delta < used);
        delta = evaluation.delta;
        rejections += 1;
    }
    assert!(rejections >= 1);
    assert!(transient.time() < 4e-3);
}

#[test]
fn test_gear_tracks_rc_charging() {
    let mut circuit = Circuit::new();
    circuit
        .add(VoltageSource::new("V1", "in", "0", 1.0))
        .add(Resistor::new("R1", "in", "out", 1e3))
        .add(Capacitor::new("C1", "out", "0", 1e-6).with_initial_condition(0.0));

    let config = TimeConfig::new(1e-5, 3e-3)
        .with_method(Method::Gear)
        .with_max_order(4)
        .with_use_ic(true);
    let mut sim = Simulator::new(circuit).unwrap();
    let mut max_order = 0;
    let mut last = 0.0;
    sim.run_transient(config, |data| {
        max_order = max_order.max(data.order);
        last = data.value("out").unwrap();
        ControlFlow::Continue(())
    })
    .unwrap();

    assert!(max_order > 1);
    assert_relative_eq!(last, 1.0 - (-3.0f64).exp(), max_relative = 5e-3);
}
