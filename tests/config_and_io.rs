mod common;

use common::generate_data;
use sortedl1::data::{load_csv, write_coefficients};
use sortedl1::{
    Centering, CenteringType, LossType, Scaling, ScalingType, ScreeningType, Slope, SlopeParameters,
    SolverType,
};
use std::fs;
use std::io::Write;
use tempfile::{NamedTempFile, tempdir};

#[test]
fn parameters_survive_a_trip_through_a_file() {
    let params = SlopeParameters {
        loss: LossType::Poisson,
        intercept: false,
        scaling: Scaling::Manual(vec![1.0, 2.0, 0.5]),
        alpha_min_ratio: Some(0.01),
        screening: ScreeningType::None,
        solver: SolverType::Pgd,
        max_clusters: Some(5),
        ..SlopeParameters::default()
    };
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(params.to_toml_string().unwrap().as_bytes()).unwrap();

    let back = SlopeParameters::from_file(file.path()).unwrap();
    assert_eq!(back, params);
}

#[test]
fn unknown_values_are_reported() {
    assert!(SlopeParameters::from_toml_str("loss = \"gamma\"\n").is_err());
    assert!(SlopeParameters::from_toml_str("tol = \"small\"\n").is_err());
    assert!(SlopeParameters::from_file("/nonexistent/sortedl1.toml").is_err());
}

#[test]
fn older_files_still_load() {
    let params = SlopeParameters::from_toml_str(
        "objective = \"poisson\"\nnormalization = \"standardization\"\nmax_iterations = 50\n",
    )
    .unwrap();
    assert_eq!(params.loss, LossType::Poisson);
    assert_eq!(params.max_it, 50);
    assert_eq!(params.centering, Centering::Type(CenteringType::Mean));
    assert_eq!(params.scaling, Scaling::Type(ScalingType::Sd));
}

#[test]
fn summaries_serialize_to_json() {
    let data = generate_data(40, 5, LossType::Quadratic, 1, 1.0, 0.4, 13);
    let path = Slope::new(SlopeParameters {
        path_length: 5,
        ..SlopeParameters::default()
    })
    .unwrap()
    .path(&data.x, data.y.view(), None, None, None)
    .unwrap();
    let json: serde_json::Value = serde_json::to_value(path.summaries()).unwrap();
    let steps = json.as_array().unwrap();
    assert_eq!(steps.len(), path.len());
    assert!(steps[0]["alpha"].as_f64().unwrap() > 0.0);
    assert_eq!(steps[0]["nonzeros"].as_u64().unwrap(), 0);
}

#[test]
fn coefficients_are_written_per_step_and_term() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("train.csv");
    let output = dir.path().join("coefficients.csv");

    let data = generate_data(30, 3, LossType::Quadratic, 1, 1.0, 1.0, 19);
    let mut text = String::from("a,b,y,c\n");
    for (row, &y) in data.x.rows().into_iter().zip(data.y.iter()) {
        text.push_str(&format!("{},{},{},{}\n", row[0], row[1], y, row[2]));
    }
    fs::write(&input, text).unwrap();

    let loaded = load_csv(&input, "y", b',').unwrap();
    assert_eq!(loaded.feature_names, vec!["a", "b", "c"]);
    assert_eq!(loaded.x, data.x);
    assert_eq!(loaded.y, data.y);

    let path = Slope::default()
        .path(&loaded.x, loaded.y.view(), Some(ndarray::array![0.5, 0.05]), None, None)
        .unwrap();
    write_coefficients(&output, &path, &loaded.feature_names).unwrap();

    let mut reader = csv::Reader::from_path(&output).unwrap();
    let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
    assert_eq!(headers, vec!["step", "alpha", "class", "term", "estimate"]);
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    let intercepts = records.iter().filter(|r| &r[3] == "(intercept)").count();
    assert_eq!(intercepts, 2);
    let second_step: Vec<&str> = records
        .iter()
        .filter(|r| &r[0] == "1" && &r[3] != "(intercept)")
        .map(|r| r.get(3).unwrap())
        .collect();
    assert_eq!(second_step.len(), path.get(1).unwrap().coefficients().nnz());
    assert!(second_step.iter().all(|t| ["a", "b", "c"].contains(t)));
}

#[test]
fn cli_fits_a_path_from_csv() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("train.csv");
    let data = generate_data(40, 4, LossType::Quadratic, 1, 1.0, 0.5, 23);
    let mut text = String::from("x1,x2,x3,x4,y\n");
    for (row, &y) in data.x.rows().into_iter().zip(data.y.iter()) {
        text.push_str(&format!("{},{},{},{},{}\n", row[0], row[1], row[2], row[3], y));
    }
    fs::write(&input, text).unwrap();

    let exe = env!("CARGO_BIN_EXE_sortedl1");
    let status = std::process::Command::new(exe)
        .current_dir(dir.path())
        .args(["path", input.to_str().unwrap(), "--path-length", "8"])
        .status()
        .expect("run sortedl1 cli");
    assert!(status.success(), "CLI exited with status {status:?}");
    assert!(dir.path().join("coefficients.csv").exists());

    let output = std::process::Command::new(exe)
        .args(["config", "--loss", "logistic", "--no-intercept"])
        .output()
        .expect("run sortedl1 config");
    assert!(output.status.success());
    let printed = SlopeParameters::from_toml_str(&String::from_utf8_lossy(&output.stdout)).unwrap();
    assert_eq!(printed.loss, LossType::Logistic);
    assert!(!printed.intercept);
}
