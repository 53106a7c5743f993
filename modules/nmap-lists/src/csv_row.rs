//! CSV rendering of port records.

use crate::record::PortRecord;

pub const CSV_HEADER: &str =
    "ip,hostname,port,service_type,service_name,device_type,tls_subject,http_title,system_info,notes";

/// Render `fields` as one CSV line without its terminator. Fields are quoted
/// only when they hold a quote, comma, CR or LF.
fn write_line<I, T>(fields: I) -> csv::Result<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    wtr.write_record(fields)?;
    let buf = wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    let mut line = String::from_utf8(buf)
        .map_err(|e| csv::Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    line.pop();
    Ok(line)
}

/// One field as it appears inside a CSV line; inner quotes are doubled.
pub fn encode_field(field: &str) -> csv::Result<String> {
    // a lone empty field would otherwise be written as `""`
    if field.is_empty() {
        return Ok(String::new());
    }
    write_line([field])
}

/// Product, version and extra info as one space-separated description.
pub fn service_description(record: &PortRecord) -> String {
    [&record.service_product, &record.service_version, &record.service_extra_info]
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One CSV line (no terminator) in [`CSV_HEADER`] column order.
pub fn render_row(record: &PortRecord) -> csv::Result<String> {
    let hostnames = record.hostnames.iter().map(String::as_str).collect::<Vec<_>>().join("/");
    let description = service_description(record);
    let fields: [&str; 10] = [
        &record.address,
        &hostnames,
        &record.port,
        &record.service_name,
        &description,
        &record.service_device_type,
        &record.tls_subject,
        &record.http_title,
        &record.system_info,
        &record.notes,
    ];
    write_line(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fields_are_untouched() {
        assert_eq!(encode_field("nginx 1.25").unwrap(), "nginx 1.25");
        assert_eq!(encode_field("").unwrap(), "");
        assert_eq!(encode_field(" lead").unwrap(), " lead");
        assert_eq!(encode_field("#hash").unwrap(), "#hash");
    }

    #[test]
    fn special_fields_are_quoted() {
        assert_eq!(encode_field("a,b").unwrap(), "\"a,b\"");
        assert_eq!(encode_field("say \"hi\"").unwrap(), "\"say \"\"hi\"\"\"");
        assert_eq!(encode_field("line1\nline2").unwrap(), "\"line1\nline2\"");
        assert_eq!(encode_field("cr\r").unwrap(), "\"cr\r\"");
        assert_eq!(encode_field("trailing\n").unwrap(), "\"trailing\n\"");
    }

    #[test]
    fn encoded_fields_read_back_with_a_csv_reader() {
        let originals = ["a,b", "quote \" inside", "multi\nline\r\nvalue", "plain", "\"\"", ",", ""];
        let line = originals.iter().map(|f| encode_field(f).unwrap()).collect::<Vec<_>>().join(",");
        let mut rdr = csv::ReaderBuilder::new().has_headers(false).from_reader(line.as_bytes());
        let record = rdr.records().next().unwrap().unwrap();
        let decoded: Vec<&str> = record.iter().collect();
        assert_eq!(decoded, originals);
    }

    #[test]
    fn row_follows_header_columns() {
        let record = PortRecord {
            address: "10.0.0.5".into(),
            hostnames: ["db1.local".to_string(), "db.corp".to_string()].into_iter().collect(),
            port: "443".into(),
            service_name: "https".into(),
            service_product: "nginx".into(),
            service_extra_info: "Ubuntu".into(),
            tls_subject: "Subject: CN=db1, O=Corp".into(),
            notes: "todo".into(),
            ..PortRecord::default()
        };
        assert_eq!(
            render_row(&record).unwrap(),
            "10.0.0.5,db.corp/db1.local,443,https,nginx Ubuntu,,\"Subject: CN=db1, O=Corp\",,,todo"
        );
        assert_eq!(CSV_HEADER.split(',').count(), 10);
    }

    #[test]
    fn row_with_multiline_system_info_stays_one_record() {
        let record = PortRecord {
            address: "10.0.0.7".into(),
            port: "445".into(),
            system_info: "smb-system-info:\nOS: Windows\n".into(),
            ..PortRecord::default()
        };
        let row = render_row(&record).unwrap();
        assert!(row.ends_with("\"smb-system-info:\nOS: Windows\n\","));
        let mut rdr = csv::ReaderBuilder::new().has_headers(false).from_reader(row.as_bytes());
        let rows: Vec<csv::StringRecord> = rdr.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][8], "smb-system-info:\nOS: Windows\n");
    }
}
