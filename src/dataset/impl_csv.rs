use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use ndarray::{Array1, Array2};
use tracing::debug;

use super::Dataset;
use crate::error::{Error, Result};

impl Dataset<f64> {
    /// Reads a header-less numeric CSV file
    ///
    /// ### Parameters
    ///
    /// * `path`: location of the file
    /// * `column_with_y`: zero based column holding the class label, every other column is a
    ///   feature
    pub fn from_csv<P: AsRef<Path>>(path: P, column_with_y: usize) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "loading csv");
        Self::from_csv_reader(file, column_with_y)
    }

    /// Reads a header-less numeric CSV from any reader, see [`Dataset::from_csv`]
    pub fn from_csv_reader<R: Read>(reader: R, column_with_y: usize) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .delimiter(b',')
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut values = Vec::new();
        let mut labels = Vec::new();
        let mut ncolumns = None;

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            if record.iter().all(|field| field.is_empty()) {
                continue;
            }

            let width = *ncolumns.get_or_insert(record.len());
            if record.len() != width {
                return Err(Error::Data(format!(
                    "row {} has {} columns, expected {}",
                    row,
                    record.len(),
                    width
                )));
            }
            if column_with_y >= width {
                return Err(Error::Parameters(format!(
                    "columnWithY is {} but the file only has {} columns",
                    column_with_y, width
                )));
            }

            for (col, field) in record.iter().enumerate() {
                let value: f64 = field.parse().map_err(|_| {
                    Error::Data(format!("row {} column {}: `{}` is not a number", row, col, field))
                })?;

                if col == column_with_y {
                    if value < 0.0 || value.fract() != 0.0 {
                        return Err(Error::Data(format!(
                            "row {}: label `{}` is not a class index",
                            row, field
                        )));
                    }
                    labels.push(value as usize);
                } else {
                    values.push(value);
                }
            }
        }

        let width = ncolumns.ok_or_else(|| Error::Data("csv contains no rows".into()))?;
        if width < 2 {
            return Err(Error::Data("csv needs a label column and at least one feature".into()));
        }
        let records = Array2::from_shape_vec((labels.len(), width - 1), values)?;

        Dataset::new(records, Array1::from(labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::io::Write;

    #[test]
    fn label_column_can_be_anywhere() -> Result<()> {
        let csv = "1,0.5,2.5\n0,1.5,3.5\n2,2.5,4.5\n";
        let dataset = Dataset::from_csv_reader(csv.as_bytes(), 0)?;

        assert_eq!(dataset.nobservations(), 3);
        assert_eq!(dataset.nfeatures(), 2);
        assert_eq!(dataset.num_classes(), 3);
        assert_eq!(dataset.label(0), 1);
        assert_abs_diff_eq!(dataset.feature_value(1, 2), 4.5);
        Ok(())
    }

    #[test]
    fn uneven_rows_are_rejected() {
        let csv = "0.5,2.5,0\n1.5,1\n";
        let res = Dataset::from_csv_reader(csv.as_bytes(), 2);
        assert!(res.is_err());
    }

    #[test]
    fn label_column_out_of_bounds_is_a_parameter_error() {
        let csv = "0.5,2.5,0\n1.5,3.5,1\n";
        let res = Dataset::from_csv_reader(csv.as_bytes(), 3);
        assert!(matches!(res, Err(Error::Parameters(_))));
    }

    #[test]
    fn fractional_label_is_rejected() {
        let csv = "0.5,2.5,0.5\n";
        let res = Dataset::from_csv_reader(csv.as_bytes(), 2);
        assert!(matches!(res, Err(Error::Data(_))));
    }

    #[test]
    fn reads_from_disk() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "5.1,3.5,1.4,0.2,0")?;
        writeln!(file, "7.0,3.2,4.7,1.4,1")?;
        writeln!(file, "6.3,3.3,6.0,2.5,2")?;

        let dataset = Dataset::from_csv(file.path(), 4)?;
        assert_eq!(dataset.nobservations(), 3);
        assert_eq!(dataset.class_counts(), vec![1, 1, 1]);
        Ok(())
    }
}
