//! Dispense plan integration tests
//!
//! Build complete batches from JSON documents and check step ordering,
//! chunking and error surfacing.

use gmx_common::{Category, Error, PlanParameters};
use gmx_plan::Batch;
use tempfile::TempDir;

const BATCH_JSON: &str = r#"{
    "species": [
        {"name": "water", "density": 1.0, "type": "solvent"},
        {"name": "Texapon SB 3 KC", "density": 1.0, "type": "surfactant"},
        {"name": "Salcare Super 7", "density": 1.0, "type": "polyelectrolyte"},
        {"name": "Arlypon F", "density": 1.0, "type": "thickener"}
    ],
    "design": {
        "columns": ["Texapon SB 3 KC", "Salcare Super 7", "Arlypon F", "Water", "Sample Density"],
        "rows": [
            {"ID": "S1", "values": [10.0, 0.0, 2.0, 88.0, 1.0]},
            {"ID": "S2", "values": [25.0, 5.0, 0.0, 70.0, 1.0]}
        ]
    }
}"#;

fn params() -> PlanParameters {
    PlanParameters {
        max_transfer_volume: 1.0,
        target_volume: 10.0,
        solvent: "water".to_string(),
    }
}

#[test]
fn test_plan_orders_columns_then_rows() {
    let batch = Batch::from_json(BATCH_JSON).unwrap();
    let prepared = batch.prepare(&params()).unwrap();

    let cells: Vec<(&str, &str)> = prepared
        .plan
        .steps
        .iter()
        .map(|s| (s.species.as_str(), s.sample_id.as_str()))
        .collect();

    // Texapon: S1 1.0 mL (1 step), S2 2.5 mL (3 steps); Salcare: S2 0.5 mL;
    // Arlypon: S1 0.2 mL
    assert_eq!(
        cells,
        vec![
            ("Texapon SB 3 KC", "S1"),
            ("Texapon SB 3 KC", "S2"),
            ("Texapon SB 3 KC", "S2"),
            ("Texapon SB 3 KC", "S2"),
            ("Salcare Super 7", "S2"),
            ("Arlypon F", "S1"),
        ]
    );

    let s2_chunks: Vec<f64> = prepared.plan.steps[1..4]
        .iter()
        .map(|s| s.target_volume)
        .collect();
    for v in &s2_chunks {
        assert!((v - 2.5 / 3.0).abs() < 1e-9);
    }
    assert_eq!(prepared.plan.steps[3].chunk, (2, 3));

    for (i, step) in prepared.plan.steps.iter().enumerate() {
        assert_eq!(step.position, i);
    }
}

#[test]
fn test_solvent_planned_separately() {
    let batch = Batch::from_json(BATCH_JSON).unwrap();
    let prepared = batch.prepare(&params()).unwrap();

    assert!(prepared
        .plan
        .steps
        .iter()
        .all(|s| s.category != Category::Solvent));

    // S1: 10 × (1 − 0.12) = 8.8 mL, S2: 10 × (1 − 0.30) = 7.0 mL
    let total = prepared.plan.total_solvent_volume();
    assert!((total - 15.8).abs() < 1e-9);
    assert_eq!(prepared.plan.solvent_steps.len(), 9 + 7);
    assert!(prepared
        .plan
        .solvent_steps
        .iter()
        .all(|s| s.target_volume <= 1.0 + 1e-12));
}

#[test]
fn test_category_filter() {
    let batch = Batch::from_json(BATCH_JSON).unwrap();
    let prepared = batch.prepare(&params()).unwrap();

    assert_eq!(prepared.plan.steps_in(Category::Surfactant).count(), 4);
    assert_eq!(prepared.plan.steps_in(Category::Polyelectrolyte).count(), 1);
    assert_eq!(prepared.plan.steps_in(Category::Thickener).count(), 1);
}

#[test]
fn test_negative_fraction_is_invalid_fraction() {
    let json = BATCH_JSON.replace("[10.0, 0.0, 2.0", "[10.0, -1.0, 2.0");
    let batch = Batch::from_json(&json).unwrap();
    let result = batch.prepare(&params());
    assert!(matches!(result, Err(Error::InvalidFraction(_))));
}

#[test]
fn test_unknown_species_column_is_not_found() {
    let json = BATCH_JSON.replace("\"Arlypon F\", \"Water\"", "\"Arlypon TT\", \"Water\"");
    let batch = Batch::from_json(&json).unwrap();
    assert!(matches!(batch.prepare(&params()), Err(Error::NotFound(_))));
}

#[test]
fn test_overfull_sample_is_invalid_composition() {
    let json = BATCH_JSON.replace("[25.0, 5.0, 0.0", "[95.0, 10.0, 0.0");
    let batch = Batch::from_json(&json).unwrap();
    assert!(matches!(
        batch.prepare(&params()),
        Err(Error::InvalidComposition(_))
    ));
}

#[test]
fn test_row_window_and_target_override() {
    let mut batch = Batch::from_json(BATCH_JSON).unwrap();
    batch.first_row = Some(-1);
    batch.target_volume = Some(20.0);
    let prepared = batch.prepare(&params()).unwrap();

    assert_eq!(prepared.samples.len(), 1);
    let s2 = prepared.samples.get("S2").unwrap();
    assert_eq!(s2.target_volume(), 20.0);
    assert!(prepared.samples.get("S1").is_err());
}

#[test]
fn test_load_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("batch.json");
    std::fs::write(&path, BATCH_JSON).unwrap();

    let batch = Batch::load(&path).unwrap();
    assert_eq!(batch.species.len(), 4);
}

#[test]
fn test_solvent_design_column_rejected() {
    let json = BATCH_JSON
        .replace(
            r#"{"name": "Arlypon F", "density": 1.0, "type": "thickener"}"#,
            r#"{"name": "Arlypon F", "density": 1.0, "type": "thickener"},
        {"name": "ethanol", "density": 0.79, "type": "solvent"}"#,
        )
        .replace("\"Arlypon F\", \"Water\"", "\"Arlypon F\", \"ethanol\", \"Water\"")
        .replace("[10.0, 0.0, 2.0, 88.0", "[10.0, 0.0, 2.0, 3.0, 85.0")
        .replace("[25.0, 5.0, 0.0, 70.0", "[25.0, 5.0, 0.0, 0.0, 70.0");
    let batch = Batch::from_json(&json).unwrap();
    assert!(matches!(batch.prepare(&params()), Err(Error::InvalidInput(_))));
}
