use serde::Serialize;

use super::ListingInput;

/// Upper bound on data rows in one upload.
pub const MAX_ROWS: usize = 500;

/// A row that could not become a listing. `row` is the 1-based line in the
/// file, header included.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    pub row: u64,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ParsedRows {
    pub valid: Vec<(u64, ListingInput)>,
    pub errors: Vec<RowError>,
}

/// Parse a CSV of listings. The header row names the same fields as the JSON
/// body (`title,description,price,location,bedrooms,bathrooms,propertyType,
/// latitude,longitude`); only `title` and `price` are required columns.
/// Each row is validated on its own; a bad row does not sink the file.
pub fn parse(data: &[u8]) -> Result<ParsedRows, String> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(data);
    let headers = reader
        .headers()
        .map_err(|e| format!("Invalid CSV header: {e}"))?
        .clone();
    for required in ["title", "price"] {
        if !headers.iter().any(|h| h == required) {
            return Err(format!("CSV is missing the '{required}' column"));
        }
    }

    let mut parsed = ParsedRows::default();
    for (index, record) in reader.records().enumerate() {
        if index >= MAX_ROWS {
            return Err(format!("A CSV upload can have at most {MAX_ROWS} rows"));
        }
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                let row = e.position().map(|p| p.line()).unwrap_or(index as u64 + 2);
                parsed.errors.push(RowError {
                    row,
                    message: format!("Unreadable row: {e}"),
                });
                continue;
            }
        };
        let row = record.position().map(|p| p.line()).unwrap_or(index as u64 + 2);
        if record.iter().all(str::is_empty) {
            continue;
        }

        let input = record
            .deserialize::<ListingInput>(Some(&headers))
            .map_err(|e| format!("Invalid row: {e}"))
            .and_then(|mut input| input.validate().map(|()| input));
        match input {
            Ok(input) => parsed.valid.push((row, input)),
            Err(message) => parsed.errors.push(RowError { row, message }),
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listings::PROPERTY_TYPES;

    #[test]
    fn rows_are_validated_one_by_one() {
        let csv = "title,description,price,location,bedrooms,bathrooms,propertyType,latitude,longitude\n\
                   Sunny flat,Top floor,25000,Kilimani,2,1,apartment,-1.29,36.78\n\
                   ,No title,1000,Karen,1,1,house,,\n\
                   Castle,Big,90000,Karen,9,9,castle,,\n\
                   \"Garden, studio\", ,12000,Lavington,0,1, House ,,\n\
                   Half pinned,,5000,Ngong,1,1,,-1.3,\n";
        let parsed = parse(csv.as_bytes()).unwrap();

        let rows: Vec<u64> = parsed.valid.iter().map(|(row, _)| *row).collect();
        assert_eq!(rows, vec![2, 5]);
        let (_, flat) = &parsed.valid[0];
        assert_eq!(flat.price, 25_000);
        assert_eq!((flat.latitude, flat.longitude), (Some(-1.29), Some(36.78)));
        let (_, studio) = &parsed.valid[1];
        assert_eq!(studio.title, "Garden, studio");
        assert_eq!(studio.property_type.as_deref(), Some("house"));
        assert_eq!(studio.latitude, None);

        assert_eq!(
            parsed.errors,
            vec![
                RowError { row: 3, message: "Title is required".into() },
                RowError {
                    row: 4,
                    message: format!("Property type must be one of: {}", PROPERTY_TYPES.join(", "))
                },
                RowError {
                    row: 6,
                    message: "Latitude and longitude must be provided together".into()
                },
            ]
        );
    }

    #[test]
    fn optional_columns_may_be_left_out() {
        let parsed = parse(b"title,price\nBedsitter,8000\n\n").unwrap();
        assert_eq!(parsed.valid.len(), 1);
        assert_eq!(parsed.valid[0].1.bedrooms, 0);
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn bad_numbers_are_row_errors() {
        let parsed = parse(b"title,price\nFlat,cheap\nHouse,30000\n").unwrap();
        assert_eq!(parsed.valid.len(), 1);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].row, 2);
        assert!(parsed.errors[0].message.starts_with("Invalid row"));
    }

    #[test]
    fn missing_required_columns_reject_the_file() {
        let err = parse(b"name,rent\nFlat,1000\n").unwrap_err();
        assert_eq!(err, "CSV is missing the 'title' column");
    }

    #[test]
    fn row_count_is_capped() {
        let mut csv = String::from("title,price\n");
        for i in 0..=MAX_ROWS {
            csv.push_str(&format!("Flat {i},1000\n"));
        }
        assert!(parse(csv.as_bytes()).unwrap_err().contains("at most"));
    }
}
