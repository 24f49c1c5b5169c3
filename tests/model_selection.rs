mod common;

use approx::assert_relative_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use common::data_path;
use perch::{
    condition::{condition_scores, ConditionScale, Habitat},
    constants::BirdId,
    export::{write_condition_csv, write_model_table_csv},
    models::{habitat_comparisons, select_models, welch_from_summary, ModelRecord},
    observations::csv_reader::{read_condition_records, read_model_records},
};

fn synthetic_records(rng: &mut StdRng, n: usize) -> Vec<ModelRecord> {
    let noise_term = Normal::new(0.0, 2.0).unwrap();
    (0..n)
        .map(|i| {
            let comm_distance = rng.random_range(60.0..220.0);
            ModelRecord {
                bird_id: BirdId(format!("S{i:02}")),
                habitat: if i % 2 == 0 { Habitat::Urban } else { Habitat::Rural },
                dialect: "north".into(),
                age: (if rng.random_bool(0.5) { "ASY" } else { "SY" }).into(),
                noise: rng.random_range(45.0..70.0),
                comm_distance,
                condition: rng.random_range(10.0..12.0),
                area_75: 3.0 * comm_distance + noise_term.sample(rng),
            }
        })
        .collect()
}

#[test]
fn test_comm_distance_outranks_null() {
    let mut rng = StdRng::seed_from_u64(2024);
    let records = synthetic_records(&mut rng, 30);
    let selection = select_models(&records).unwrap();

    assert!(selection.rank_of("comm_distance").unwrap() < selection.rank_of("null").unwrap());
    let best = selection.best().unwrap();
    assert!(best.name.contains("comm_distance"));
    let slope = best
        .coefficients
        .iter()
        .find(|c| c.term == "comm_distance")
        .unwrap();
    assert_relative_eq!(slope.estimate, 3.0, epsilon = 0.05);
    assert!(slope.p_value < 1e-6);
}

#[test]
fn test_model_sheet_and_table() {
    let records = read_model_records(data_path("models.csv"), b',').unwrap();
    assert_eq!(records.len(), 24);

    let selection = select_models(&records).unwrap();
    assert_eq!(selection.models.len() + selection.failures.len(), 16);
    assert!(selection.rank_of("comm_distance").unwrap() < selection.rank_of("null").unwrap());

    let mut buf = Vec::new();
    write_model_table_csv(&mut buf, &selection).unwrap();
    let text = String::from_utf8(buf).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("rank,model,n,k,log_likelihood,aicc,delta_aicc,weight,r_squared")
    );
    assert!(lines.next().unwrap().starts_with("1,"));
    assert_eq!(text.lines().count(), 1 + selection.models.len());

    let comparisons = habitat_comparisons(&records).unwrap();
    assert_eq!(comparisons.comm_distance.n_a + comparisons.comm_distance.n_b, 24);
}

#[test]
fn test_welch_reference_summary() {
    let w = welch_from_summary(5440.0, 800.0, 12, 2328.0, 400.0, 11).unwrap();
    assert!(w.p_value < 0.05);
    assert_relative_eq!(w.df, 16.08, epsilon = 0.01);
}

#[test]
fn test_condition_sheet() {
    let records = read_condition_records(data_path("condition.csv"), b',').unwrap();
    assert_eq!(records.len(), 14);

    let (smi, scores) = condition_scores(&records, ConditionScale::Linear).unwrap();
    assert_eq!(smi.n, 14);
    assert_eq!(scores.len(), 14);
    // a bird at the mean wing length keeps its own weight
    assert_relative_eq!(smi.index(smi.mean_wing_length, 11.0), 11.0, epsilon = 1e-12);

    let mut buf = Vec::new();
    write_condition_csv(&mut buf, &scores).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert!(text.starts_with("bird_id,habitat,wing_length,weight,condition_index\n"));
    assert_eq!(text.lines().count(), 15);
}
