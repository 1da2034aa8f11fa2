//! Configuration- and netlist-driven simulation tests.

use pulsim::config::{ConfigError, SimConfig, SimConfigBuilder};
use pulsim::netlist::Netlist;
use pulsim::registry::{create_default_library, CellParams};
use pulsim::{run_batch, Cell, FunctionalCell, SimError, Simulator, SourceSchedule, TransitionKind};

const PIPELINE: &str = r#"
simulation:
  horizon: 1000
  log_level: debug

netlist:
  cells:
    - name: data
      kind: SOURCE
    - name: clk
      kind: SOURCE
    - name: j0
      kind: JTL
      params:
        firing_delay: 10
    - name: ff
      kind: DRO
    - name: out
      kind: SINK
  connections:
    - from: data.q
      to: j0.a
    - from: j0.q
      to: ff.a
    - from: clk.q
      to: ff.clk
    - from: ff.q
      to: [out.a]
      name: result
  sources:
    - cell: data
      times: [0, 200]
    - cell: clk
      times: [100, 300, 1200]
  sinks: [out]
"#;

#[test]
fn test_yaml_config_end_to_end() {
    let config = SimConfig::from_yaml(PIPELINE).unwrap();
    let circuit = config.build_circuit(&create_default_library()).unwrap();

    let trace = Simulator::new(&circuit)
        .with_params(config.simulation.clone())
        .run_configured()
        .unwrap();

    // data reaches the flip-flop 10 later, each clock reads it out 51 later
    assert_eq!(trace.arrivals_by_name("result"), Some(&[151, 351][..]));
    // the clock at 1200 lies beyond the horizon
    assert!(!trace.outcome.is_quiescent());
    assert_eq!(trace.stats.final_time, 351);
}

#[test]
fn test_json_netlist_equivalent_to_yaml() {
    let yaml = SimConfig::from_yaml(PIPELINE).unwrap();
    let json = SimConfig::from_json(&yaml.to_json().unwrap()).unwrap();
    assert_eq!(yaml, json);

    let library = create_default_library();
    let a = yaml.build_circuit(&library).unwrap();
    let b = json.build_circuit(&library).unwrap();
    let ta = Simulator::new(&a).run(Some(1000)).unwrap();
    let tb = Simulator::new(&b).run(Some(1000)).unwrap();
    assert_eq!(ta.to_json().unwrap(), tb.to_json().unwrap());
}

#[test]
fn test_unknown_cell_kind_in_netlist() {
    let netlist = Netlist::new()
        .cell("in", "SOURCE")
        .cell("x", "XORQ")
        .connect("in.q", ["x.a"]);
    let err = netlist.build(&create_default_library()).unwrap_err();
    assert_eq!(
        err,
        SimError::UnknownCellKind {
            kind: "XORQ".into(),
            cell: "x".into()
        }
    );
}

#[test]
fn test_invalid_param_is_reported() {
    let mut params = CellParams::new();
    params.insert("firing_delay".into(), "soon".into());
    let config = SimConfigBuilder::new()
        .cell_with("j", "JTL", params)
        .build()
        .unwrap();

    let err = config.build_circuit(&create_default_library()).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Build(SimError::InvalidParam { ref key, .. }) if key == "firing_delay"
    ));
}

#[test]
fn test_per_output_firing_delay_from_yaml() {
    let yaml = r#"
simulation:
  horizon: 500
netlist:
  cells:
    - name: in
      kind: SOURCE
    - name: s
      kind: S
      params:
        firing_delay.r: 50
    - name: left
      kind: SINK
    - name: right
      kind: SINK
  connections:
    - from: in.q
      to: s.a
    - from: s.l
      to: left.a
      name: left
    - from: s.r
      to: right.a
      name: right
  sources:
    - cell: in
      times: [0, 100]
  sinks: [left, right]
"#;
    let config = SimConfig::from_yaml(yaml).unwrap();
    let circuit = config.build_circuit(&create_default_library()).unwrap();
    let trace = Simulator::new(&circuit).run(None).unwrap();

    // only the keyed output is slowed down
    assert_eq!(trace.arrivals_by_name("left"), Some(&[43, 143][..]));
    assert_eq!(trace.arrivals_by_name("right"), Some(&[50, 150][..]));
}

#[test]
fn test_double_driven_input_rejected() {
    let netlist = Netlist::new()
        .cell("a", "SOURCE")
        .cell("b", "SOURCE")
        .cell("j", "JTL")
        .connect("a.q", ["j.a"])
        .connect("b.q", ["j.a"]);
    let err = netlist.build(&create_default_library()).unwrap_err();
    assert!(matches!(err, SimError::PortAlreadyDriven { .. }));
}

#[test]
fn test_custom_kind_in_library() {
    let mut library = create_default_library();
    library.register("DELAY5", |name: &str, _: &CellParams| {
        let f = FunctionalCell::new("DELAY5", ["a"], ["q"], |inv: &pulsim::Invocation<'_>| {
            inv.new.iter().map(|_| pulsim::Emission::after(0, 5)).collect()
        })
        .with_min_delay(5);
        Ok(Cell::functional(name, f))
    });

    let circuit = Netlist::new()
        .cell("in", "SOURCE")
        .cell("d", "DELAY5")
        .cell("out", "SINK")
        .connect("in.q", ["d.a"])
        .connect("d.q", ["out.a"])
        .named("delayed")
        .source("in", vec![1, 2])
        .sink("out")
        .build(&library)
        .unwrap();

    let trace = Simulator::new(&circuit).run(None).unwrap();
    assert_eq!(trace.arrivals_by_name("delayed"), Some(&[6, 7][..]));
    assert_eq!(circuit.cell(circuit.cell_by_name("d").unwrap()).unwrap().kind(), "DELAY5");
}

#[test]
fn test_describe_imported_cells() {
    let config = SimConfig::from_yaml(PIPELINE).unwrap();
    let circuit = config.build_circuit(&create_default_library()).unwrap();

    let described = circuit.describe_cells();
    let names: Vec<_> = described.iter().map(|(_, name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["j0", "ff"]);

    let (_, _, dro) = &described[1];
    assert_eq!(dro.name, "DRO");
    assert_eq!(dro.inputs, vec!["a", "clk"]);
    assert_eq!(dro.jjs, Some(6));
    assert!(dro.transitions.iter().all(|t| t.kind == TransitionKind::Normal));
    let fired: Vec<_> = dro.transitions.iter().filter(|t| !t.firing.is_empty()).map(|t| t.id.as_str()).collect();
    assert_eq!(fired, vec!["3"]);
}

#[test]
fn test_batch_over_imported_circuit() {
    let config = SimConfig::from_yaml(PIPELINE).unwrap();
    let circuit = config.build_circuit(&create_default_library()).unwrap();
    let clk = circuit.cell_by_name("clk").unwrap();

    let schedules: Vec<_> = [100u64, 150, 250]
        .iter()
        .map(|&t| SourceSchedule::new().with(clk, vec![t]))
        .collect();
    let results = run_batch(&circuit, &schedules, &config.simulation);

    let outputs: Vec<Vec<u64>> = results
        .into_iter()
        .map(|r| r.unwrap().arrivals_by_name("result").unwrap().to_vec())
        .collect();
    assert_eq!(outputs, vec![vec![151], vec![201], vec![301]]);
}
