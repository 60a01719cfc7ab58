//! DV-021: Problem bundle persistence — atomic save, canonical output stamping.

use super::types::{Problem, Relation, TableData, Value};
use std::path::Path;

/// Save a bundle atomically (write to temp, then rename).
pub fn save_problem(path: &Path, problem: &Problem) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
    }

    let yaml = serde_yaml_ng::to_string(problem).map_err(|e| format!("serialize error: {}", e))?;

    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, &yaml)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        format!(
            "cannot rename {} → {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;

    Ok(())
}

/// Copy of `problem` carrying `canonical` as its expected output.
///
/// The interchange format has no encoding for infinite reals, so a canonical
/// output holding one is refused rather than stored as null. NaN is stored as
/// null, which the checker already treats as equal.
pub fn with_canonical(problem: &Problem, canonical: &Relation) -> Result<Problem, String> {
    for (i, row) in canonical.rows().iter().enumerate() {
        for (value, column) in row.iter().zip(canonical.columns()) {
            if let Value::Real(r) = value {
                if r.is_infinite() {
                    return Err(format!(
                        "canonical output has non-finite value {} at row {}, column '{}'; it cannot be stored",
                        r, i, column
                    ));
                }
            }
        }
    }
    Ok(Problem {
        expected_output: Some(TableData::from(canonical.clone())),
        ..problem.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::{expected_relation, parse_problem, parse_problem_file, PROBLEM_TEMPLATE};

    fn canonical() -> Relation {
        Relation::new(
            vec!["name".into(), "when".into(), "score".into()],
            vec![
                vec![
                    Value::Text("Alice".into()),
                    Value::Temporal("2024-03-01".into()),
                    Value::Real(0.5),
                ],
                vec![Value::Text("Bob".into()), Value::Null, Value::Integer(3)],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_dv021_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/problem.yaml");
        let problem = with_canonical(&parse_problem(PROBLEM_TEMPLATE).unwrap(), &canonical()).unwrap();
        save_problem(&path, &problem).unwrap();

        let loaded = parse_problem_file(&path).unwrap();
        assert_eq!(loaded.question, problem.question);
        assert_eq!(expected_relation(&loaded).unwrap(), Some(canonical()));
    }

    #[test]
    fn test_dv021_infinite_canonical_refused() {
        let problem = parse_problem(PROBLEM_TEMPLATE).unwrap();
        let rel = Relation::new(
            vec!["x".into()],
            vec![vec![Value::Real(1.0)], vec![Value::Real(f64::NEG_INFINITY)]],
        )
        .unwrap();
        let err = with_canonical(&problem, &rel).unwrap_err();
        assert!(err.contains("row 1, column 'x'"));

        let nan = Relation::new(vec!["x".into()], vec![vec![Value::Real(f64::NAN)]]).unwrap();
        let stamped = with_canonical(&problem, &nan).unwrap();
        let stored = expected_relation(&stamped).unwrap().unwrap();
        assert_eq!(stored.rows()[0][0], Value::Null);
    }

    #[test]
    fn test_dv021_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("problem.yaml");
        save_problem(&path, &parse_problem(PROBLEM_TEMPLATE).unwrap()).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("problem.yaml.tmp").exists());
    }

    #[test]
    fn test_dv021_roundtrip_preserves_table_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.yaml");
        let yaml = r#"
version: "1.0"
topic: t
question: q
input_tables:
  zeta: { columns: [a], data: [[1]] }
  alpha: { columns: [a], data: [[2]] }
"#;
        save_problem(&path, &parse_problem(yaml).unwrap()).unwrap();
        let loaded = parse_problem_file(&path).unwrap();
        let names: Vec<&String> = loaded.input_tables.keys().collect();
        assert_eq!(names, ["zeta", "alpha"]);
        assert!(loaded.expected_output.is_none());
    }
}
