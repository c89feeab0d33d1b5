use crate::error::{Error, Result};
use std::{fs::File, io::Read, path::Path};

/// The two samplesheet columns the planner needs, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Samplesheet {
    pub lanes: Vec<String>,
    pub samples: Vec<String>,
}

fn get_key_col(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|field| field == name)
        .ok_or_else(|| Error::InvalidInput(format!("samplesheet has no '{}' column", name)))
}

/// Read the lane and sample columns out of a samplesheet CSV.
///
/// Cells are trimmed. A missing column, an empty cell or a sheet without data
/// rows is `InvalidInput`.
pub fn read(path: &Path, lane_column: &str, sample_column: &str) -> Result<Samplesheet> {
    let file = File::open(path).map_err(|e| {
        Error::InvalidInput(format!("could not open samplesheet {}: {}", path.display(), e))
    })?;
    from_reader(file, lane_column, sample_column)
}

pub fn from_reader<R: Read>(reader: R, lane_column: &str, sample_column: &str) -> Result<Samplesheet> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    let lane_col = get_key_col(&headers, lane_column)?;
    let sample_col = get_key_col(&headers, sample_column)?;

    let mut sheet = Samplesheet {
        lanes: Vec::new(),
        samples: Vec::new(),
    };
    for (i, row) in rdr.records().enumerate() {
        let row = row?;
        // Header is line 1.
        let line = i + 2;
        for (col, name, out) in [
            (lane_col, lane_column, &mut sheet.lanes),
            (sample_col, sample_column, &mut sheet.samples),
        ] {
            match row.get(col) {
                Some(value) if !value.is_empty() => out.push(value.to_owned()),
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "samplesheet line {} has an empty '{}' cell",
                        line, name
                    )))
                }
            }
        }
    }

    if sheet.samples.is_empty() {
        return Err(Error::InvalidInput("samplesheet has no data rows".to_owned()));
    }
    log::debug!(
        "Read {} samplesheet rows ({} columns)",
        sheet.samples.len(),
        headers.len()
    );
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_read_samplesheet() {
        let sheet = read(&PathBuf::from("tests/test_samplesheet.csv"), "Lane", "Sample").unwrap();
        assert_eq!(sheet.lanes, vec!["1", "1", "2", "2", "3"]);
        assert_eq!(
            sheet.samples,
            vec!["Sample_B", "Sample_A", "Sample_C", "Sample_D", "Sample_E"]
        );
    }

    #[test]
    fn test_cells_are_trimmed() {
        let data = "Lane, Sample ,Index\n 2 , S1 ,SI-GA-A1\n";
        let sheet = from_reader(data.as_bytes(), "Lane", "Sample").unwrap();
        assert_eq!(sheet.lanes, vec!["2"]);
        assert_eq!(sheet.samples, vec!["S1"]);
    }

    #[test]
    fn test_custom_column_names() {
        let data = "lane_id,library\n1,L1\n";
        let sheet = from_reader(data.as_bytes(), "lane_id", "library").unwrap();
        assert_eq!(sheet.samples, vec!["L1"]);
    }

    #[test]
    fn test_missing_column() {
        let data = "Lane,Index\n1,SI-GA-A1\n";
        assert!(matches!(
            from_reader(data.as_bytes(), "Lane", "Sample"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_empty_samplesheet() {
        let sheet = read(&PathBuf::from("tests/test_empty_samplesheet.csv"), "Lane", "Sample");
        assert!(matches!(sheet, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_empty_cell() {
        let data = "Lane,Sample\n1,S1\n,S2\n";
        assert!(matches!(
            from_reader(data.as_bytes(), "Lane", "Sample"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let sheet = read(&PathBuf::from("tests/no_such_samplesheet.csv"), "Lane", "Sample");
        assert!(matches!(sheet, Err(Error::InvalidInput(_))));
    }
}
