//! CSV ingestion and export of observation tables.

use std::io::Write;
use std::path::Path;

use cf_core::{Error, ObservationTable, Result};

fn parse_treatment(raw: &str, row: usize, col: &str) -> Result<u8> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true" => Ok(1),
        "0" | "0.0" | "false" => Ok(0),
        other => Err(Error::Data(format!(
            "row {row}, column '{col}': treatment must be 0/1/true/false, got '{other}'"
        ))),
    }
}

fn parse_number(raw: &str, row: usize, col: &str) -> Result<f64> {
    let v: f64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::Data(format!("row {row}, column '{col}': '{raw}' is not numeric")))?;
    if !v.is_finite() {
        return Err(Error::Data(format!("row {row}, column '{col}': value is not finite")));
    }
    Ok(v)
}

fn csv_error(path: &Path, e: csv::Error) -> Error {
    Error::Data(format!("{}: {e}", path.display()))
}

/// Read an observation table from a headed CSV file.
///
/// `covariates` selects covariate columns by name; when empty every column
/// other than the treatment and outcome columns is used. Rows are numbered
/// from 1 (the first data row) in error messages.
pub fn read_observations(
    path: &Path,
    treatment_col: &str,
    outcome_col: &str,
    covariates: &[String],
) -> Result<ObservationTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;
    let headers: Vec<String> =
        rdr.headers().map_err(|e| csv_error(path, e))?.iter().map(|h| h.to_string()).collect();

    let find = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::Data(format!("column '{name}' not found in {}", path.display())))
    };
    let t_idx = find(treatment_col)?;
    let y_idx = find(outcome_col)?;
    let cov_names: Vec<String> = if covariates.is_empty() {
        headers.iter().filter(|h| *h != treatment_col && *h != outcome_col).cloned().collect()
    } else {
        covariates.to_vec()
    };
    let cov_idx = cov_names.iter().map(|n| find(n)).collect::<Result<Vec<_>>>()?;

    let mut treatment = Vec::new();
    let mut outcome = Vec::new();
    let mut rows = Vec::new();
    for (r, record) in rdr.records().enumerate() {
        let row = r + 1;
        let record = record.map_err(|e| csv_error(path, e))?;
        let field = |j: usize| record.get(j).unwrap_or("");
        treatment.push(parse_treatment(field(t_idx), row, treatment_col)?);
        outcome.push(parse_number(field(y_idx), row, outcome_col)?);
        rows.push(
            cov_idx
                .iter()
                .zip(&cov_names)
                .map(|(&j, name)| parse_number(field(j), row, name))
                .collect::<Result<Vec<f64>>>()?,
        );
    }
    if treatment.is_empty() {
        return Err(Error::Data(format!("{} contains no data rows", path.display())));
    }
    ObservationTable::new(treatment, outcome, rows, cov_names)
}

/// Write `table` as CSV (`treatment,outcome,<covariates>`).
pub fn write_observations<W: Write>(table: &ObservationTable, out: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(out);
    let to_err = |e: csv::Error| Error::Computation(format!("failed to write CSV: {e}"));
    let mut header = vec!["treatment".to_string(), "outcome".to_string()];
    header.extend(table.covariate_names().iter().cloned());
    wtr.write_record(&header).map_err(to_err)?;
    for i in 0..table.n_rows() {
        let mut rec = vec![table.treatment()[i].to_string(), table.outcome()[i].to_string()];
        rec.extend(table.row(i).iter().map(|v| v.to_string()));
        wtr.write_record(&rec).map_err(to_err)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_tmp(name: &str, body: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("causalfit_data_{}_{}", std::process::id(), name));
        std::fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn test_read_with_explicit_covariates() {
        let p = write_tmp(
            "ok.csv",
            "net,risk,income,temp\ntrue,30.5,800,21\n0,41,700,25\n1,28,950,22\n",
        );
        let t = read_observations(&p, "net", "risk", &["income".to_string()]).unwrap();
        assert_eq!(t.n_rows(), 3);
        assert_eq!(t.treatment(), &[1, 0, 1]);
        assert_eq!(t.covariate_names(), &["income"]);
        let all = read_observations(&p, "net", "risk", &[]).unwrap();
        assert_eq!(all.n_covariates(), 2);
    }

    #[test]
    fn test_bad_cell_names_row_and_column() {
        let p = write_tmp("bad.csv", "t,y,x\n1,1.0,2\n0,2.0,abc\n");
        let err = read_observations(&p, "t", "y", &[]).unwrap_err();
        let msg = err.to_string();
        assert!(matches!(err, Error::Data(_)));
        assert!(msg.contains("row 2") && msg.contains("'x'"), "{msg}");

        let p = write_tmp("badt.csv", "t,y,x\n2,1.0,2\n0,2.0,1\n");
        assert!(read_observations(&p, "t", "y", &[]).is_err());
        assert!(read_observations(&p, "missing", "y", &[]).is_err());
    }

    #[test]
    fn test_write_then_read() {
        let t = cf_inference::stratified_design(40, 2.0).unwrap();
        let p = write_tmp("rt.csv", "");
        write_observations(&t, std::fs::File::create(&p).unwrap()).unwrap();
        let back = read_observations(&p, "treatment", "outcome", &[]).unwrap();
        assert_eq!(back, t);
    }
}
