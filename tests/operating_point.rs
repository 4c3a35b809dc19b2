//! Operating point scenarios on complete circuits.

use approx::assert_relative_eq;
use nodal_core::components::{Capacitor, CurrentSource, Diode, DiodeParams, Resistor, VoltageSource};
use nodal_core::solver::InitMode;
use nodal_core::{BiasingConfig, Circuit, EngineError, Simulator};

#[test]
fn test_series_resistor_and_source() {
    let mut circuit = Circuit::new();
    circuit
        .add(VoltageSource::new("V1", "out", "0", 10.0))
        .add(Resistor::new("R1", "out", "0", 1e3));

    let mut sim = Simulator::new(circuit).unwrap();
    let iterations = sim.operating_point().unwrap();

    assert_eq!(iterations, 1);
    assert_relative_eq!(sim.value("out").unwrap(), 10.0, epsilon = 1e-12);
    // The branch current enters the positive terminal.
    assert_relative_eq!(sim.value("V1").unwrap(), -0.01, epsilon = 1e-15);
    assert_eq!(sim.statistics().op_iterations, 1);
}

#[test]
fn test_linear_network_ignores_starting_guess() {
    let mut circuit = Circuit::new();
    circuit
        .add(VoltageSource::new("V1", "in", "0", 12.0))
        .add(Resistor::new("R1", "in", "a", 2e3))
        .add(Resistor::new("R2", "a", "0", 1e3))
        .add(Resistor::new("R3", "a", "b", 1e3))
        .add(Resistor::new("R4", "b", "0", 1e3));

    let mut sim = Simulator::new(circuit).unwrap();
    sim.system_mut()
        .state_mut()
        .solution
        .iter_mut()
        .enumerate()
        .for_each(|(i, x)| *x = 1e3 * i as f64);

    assert_eq!(sim.operating_point().unwrap(), 1);
    // R2 || (R3 + R4) = 2k/3
    let expected = 12.0 * (2e3 / 3.0) / (2e3 + 2e3 / 3.0);
    assert_relative_eq!(sim.value("a").unwrap(), expected, max_relative = 1e-12);
    assert_relative_eq!(sim.value("b").unwrap(), expected / 2.0, max_relative = 1e-12);
}

#[test]
fn test_diode_clamp() {
    let mut circuit = Circuit::new();
    circuit
        .add(VoltageSource::new("V1", "in", "0", 9.0))
        .add(Resistor::new("R1", "in", "a", 4.7e3))
        .add(Diode::new("D1", "a", "b", DiodeParams::default()))
        .add(Diode::new("D2", "b", "0", DiodeParams::default()));

    let mut sim = Simulator::new(circuit).unwrap();
    let iterations = sim.operating_point().unwrap();
    assert!(iterations > 2);
    assert_eq!(sim.system().state().mode, InitMode::Float);

    let a = sim.value("a").unwrap();
    let b = sim.value("b").unwrap();
    assert!(a > 1.0 && a < 1.6, "clamp voltage {a}");
    // Identical diodes in series share the drop.
    assert_relative_eq!(b, a / 2.0, max_relative = 1e-3);
}

#[test]
fn test_grouped_circuit_matches_single_group() {
    let build = |grouped: bool| {
        let mut circuit = Circuit::new();
        circuit.add(VoltageSource::new("V1", "in", "0", 5.0));
        let g = if grouped { circuit.add_group() } else { 0 };
        circuit.add_to_group(g, Resistor::new("R1", "in", "a", 1e3));
        let g = if grouped { circuit.add_group() } else { 0 };
        circuit.add_to_group(g, Diode::new("D1", "a", "0", DiodeParams::default()));
        circuit
    };

    let config = BiasingConfig::default().with_parallel(true);
    let mut single = Simulator::with_config(build(false), config.clone()).unwrap();
    let mut grouped = Simulator::with_config(build(true), config).unwrap();
    single.operating_point().unwrap();
    grouped.operating_point().unwrap();

    assert_relative_eq!(
        single.value("a").unwrap(),
        grouped.value("a").unwrap(),
        max_relative = 1e-9
    );
}

#[test]
fn test_floating_node_is_singular() {
    let mut circuit = Circuit::new();
    circuit
        .add(CurrentSource::new("I1", "0", "a", 1e-3))
        .add(Capacitor::new("C1", "a", "0", 1e-6));

    let mut sim = Simulator::new(circuit).unwrap();
    let result = sim.operating_point();
    assert!(matches!(result, Err(EngineError::SingularMatrix { .. })));
}

#[test]
fn test_unknown_variable() {
    let mut circuit = Circuit::new();
    circuit
        .add(VoltageSource::new("V1", "a", "0", 1.0))
        .add(Resistor::new("R1", "a", "0", 1.0));
    let mut sim = Simulator::new(circuit).unwrap();
    sim.operating_point().unwrap();
    assert!(matches!(
        sim.value("nope"),
        Err(EngineError::UnknownVariable { .. })
    ));
}
