//! CSV export of collected email leads.

use crate::error::{AppError, Result};
use crate::models::{EmailOrigin, EmailRecord};
use std::collections::HashMap;
use std::path::Path;

/// Renders one (profession, state) result set as CSV text.
///
/// The header is `Email,Source,Profession,State`, with a trailing `City`
/// column when an attribution map is supplied. Rows keep the order of
/// `emails`; addresses missing from the attribution map get an empty city.
pub(crate) fn emails_to_csv(
    emails: &[EmailRecord],
    profession: &str,
    state: &str,
    attribution: Option<&HashMap<String, EmailOrigin>>,
) -> Result<String> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());

    let mut header = vec!["Email", "Source", "Profession", "State"];
    if attribution.is_some() {
        header.push("City");
    }
    writer.write_record(&header)?;

    for record in emails {
        let mut row = vec![
            record.address.as_str(),
            record.source_domain.as_str(),
            profession,
            state,
        ];
        let city;
        if let Some(map) = attribution {
            city = map
                .get(&record.address)
                .map(|origin| origin.city.clone())
                .unwrap_or_default();
            row.push(&city);
        }
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Config(format!("Failed to finalize CSV: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| AppError::Config(format!("CSV was not UTF-8: {}", e)))
}

/// Writes one result set to `path` as CSV.
pub(crate) fn write_csv_file(
    path: &Path,
    emails: &[EmailRecord],
    profession: &str,
    state: &str,
    attribution: Option<&HashMap<String, EmailOrigin>>,
) -> Result<()> {
    let csv = emails_to_csv(emails, profession, state, attribution)?;
    std::fs::write(path, csv)?;
    tracing::info!(
        target: "export_task",
        "Wrote {} emails to {}",
        emails.len(),
        path.display()
    );
    Ok(())
}

/// Parses CSV text produced by [`emails_to_csv`] back into records. The
/// Profession/State/City columns are positional and ignored here; callers
/// that need them already know which file they read.
pub(crate) fn parse_rows(csv_text: &str) -> Result<Vec<EmailRecord>> {
    let mut reader = csv::ReaderBuilder::new().from_reader(csv_text.as_bytes());
    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let address = row.get(0).unwrap_or_default().to_string();
        let source_domain = row.get(1).unwrap_or_default().to_string();
        if !address.is_empty() {
            records.push(EmailRecord {
                address,
                source_domain,
            });
        }
    }
    Ok(records)
}

/// The exported file name for one (profession, state) pair, with runs of
/// whitespace collapsed to single underscores.
pub(crate) fn csv_file_name(profession: &str, state: &str) -> String {
    format!(
        "{}_{}_emails.csv",
        slugify(profession),
        slugify(state)
    )
}

fn slugify(part: &str) -> String {
    part.trim()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(address: &str, source: &str) -> EmailRecord {
        EmailRecord {
            address: address.to_string(),
            source_domain: source.to_string(),
        }
    }

    #[test]
    fn test_csv_layout_without_city() {
        let emails = vec![
            record("jane@realty.com", "linkedin.com"),
            record("bob@homes.net", "google.com"),
        ];
        let csv = emails_to_csv(&emails, "realtor", "Texas", None).unwrap();
        assert_eq!(
            csv,
            "Email,Source,Profession,State\n\
             jane@realty.com,linkedin.com,realtor,Texas\n\
             bob@homes.net,google.com,realtor,Texas\n"
        );
    }

    #[test]
    fn test_csv_layout_with_city_attribution() {
        let emails = vec![
            record("jane@realty.com", "linkedin.com"),
            record("bob@homes.net", "google.com"),
        ];
        let mut attribution = HashMap::new();
        attribution.insert(
            "jane@realty.com".to_string(),
            EmailOrigin {
                city: "Dallas".to_string(),
                source: "linkedin.com".to_string(),
            },
        );
        let csv = emails_to_csv(&emails, "realtor", "Texas", Some(&attribution)).unwrap();
        assert_eq!(
            csv,
            "Email,Source,Profession,State,City\n\
             jane@realty.com,linkedin.com,realtor,Texas,Dallas\n\
             bob@homes.net,google.com,realtor,Texas,\n"
        );
    }

    #[test]
    fn test_fields_with_commas_are_quoted() {
        let emails = vec![record("jane@realty.com", "linkedin.com")];
        let csv = emails_to_csv(&emails, "sales, retail", "Texas", None).unwrap();
        assert!(csv.contains("\"sales, retail\""));
    }

    #[test]
    fn test_round_trip_preserves_records() {
        let emails = vec![
            record("jane@realty.com", "linkedin.com"),
            record("bob@homes.net", "google.com"),
        ];
        let csv = emails_to_csv(&emails, "realtor", "Texas", None).unwrap();
        let parsed = parse_rows(&csv).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].address, "jane@realty.com");
        assert_eq!(parsed[0].source_domain, "linkedin.com");
        assert_eq!(parsed[1].address, "bob@homes.net");
    }

    #[test]
    fn test_empty_input_yields_header_only() {
        let csv = emails_to_csv(&[], "realtor", "Texas", None).unwrap();
        assert_eq!(csv, "Email,Source,Profession,State\n");
        assert!(parse_rows(&csv).unwrap().is_empty());
    }

    #[test]
    fn test_file_name_collapses_whitespace() {
        assert_eq!(
            csv_file_name("real estate agent", "New  York"),
            "real_estate_agent_New_York_emails.csv"
        );
        assert_eq!(csv_file_name("realtor", "Texas"), "realtor_Texas_emails.csv");
    }
}
