//! Field extraction: parsed XML → [`ExtractedContext`].
//!
//! Every scalar is a first-match lookup in document order; repeated
//! structures (deposit records, polygon points, license numbers) are
//! collected in document order. Absent fields are `None`/empty, never an
//! error. Only the configured required fields can fail extraction.

use crate::error::Xml2PdfError;
use crate::pipeline::xml::{XmlDocument, XmlElement};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::debug;

/// Timestamp format for deposit records without `last_change_date`.
pub const DEPOSIT_DATE_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Everything the template can see.
///
/// Serialises to a flat mapping whose keys are the template variable names.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractedContext {
    /// `FullName`
    pub name: Option<String>,
    /// `LastName`
    pub last_name: Option<String>,
    /// `FirstName`
    pub first_name: Option<String>,
    /// `MiddleName`
    pub middle_name: Option<String>,
    /// `INN`
    pub inn: Option<String>,
    /// `RepresentativeSNILS`
    pub snils: Option<String>,
    /// `Phone`
    pub tel: Option<String>,
    /// `Email`
    pub email: Option<String>,
    /// `RequestDate`
    pub date: Option<String>,
    /// `UniqueID`
    pub inv: Option<String>,
    /// `CadastralNumber`
    pub cad: Option<String>,
    /// `DepositPresence`, verbatim.
    pub is_deposit: Option<String>,
    /// `HasAreaInCity`, verbatim.
    pub in_city: Option<String>,
    /// `CoordinateSystem`
    pub coordinate_system: Option<String>,
    /// Every complete point as `"lat, lon"`, document order.
    pub coords: Vec<String>,
    /// Points grouped by their enclosing `Polygon`.
    pub polygons: Vec<Polygon>,
    /// Present only when `DepositPresence` is truthy per [`is_truthy`];
    /// a literal `false` counts as absent.
    pub deposit_info_list: Option<Vec<DepositRecord>>,
    /// Exactly ten deposit records.
    pub is_10: bool,
    /// Test-mode flag.
    pub test: bool,
    /// Signer display name.
    pub signer: String,
    /// Generation timestamp (`dd.mm.YYYY HH:MM:SS`).
    pub generated_at: String,
}

impl ExtractedContext {
    /// The submission's unique identifier, if present.
    pub fn unique_id(&self) -> Option<&str> {
        self.inv.as_deref()
    }
}

/// One `DepositInfo` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepositRecord {
    pub name: Option<String>,
    pub cad_num: Option<String>,
    /// All `LicenseNumber` values joined with `", "`.
    pub licenses: String,
    pub last_change_date: String,
}

/// A coordinate pair as written in the submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coordinate {
    pub latitude: String,
    pub longitude: String,
}

/// Points of one `Polygon` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Polygon {
    pub points: Vec<Coordinate>,
}

/// Inputs to extraction that do not come from the XML.
#[derive(Debug, Clone)]
pub struct ExtractOptions<'a> {
    pub required_fields: &'a [String],
    pub test_mode: bool,
    pub signer: &'a str,
    pub now: DateTime<FixedOffset>,
}

/// Build the template context from a parsed submission.
///
/// # Errors
/// [`Xml2PdfError::MissingRequiredField`] for the first required tag that
/// has no non-empty element. Nothing else fails.
pub fn extract(
    doc: &XmlDocument,
    options: &ExtractOptions<'_>,
) -> Result<ExtractedContext, Xml2PdfError> {
    let root = doc.root();

    for field in options.required_fields {
        if root.find_first(field).is_none() {
            return Err(Xml2PdfError::MissingRequiredField {
                field: field.clone(),
            });
        }
    }

    let scalar = |tag: &str| root.find_first(tag).map(str::to_string);
    let now = options.now.format(DEPOSIT_DATE_FORMAT).to_string();

    let is_deposit = scalar("DepositPresence");
    let deposit_info_list = is_deposit
        .as_deref()
        .filter(|v| is_truthy(v))
        .map(|_| extract_deposits(root, &now));
    let is_10 = deposit_info_list
        .as_ref()
        .is_some_and(|deposits| deposits.len() == 10);

    let context = ExtractedContext {
        name: scalar("FullName"),
        last_name: scalar("LastName"),
        first_name: scalar("FirstName"),
        middle_name: scalar("MiddleName"),
        inn: scalar("INN"),
        snils: scalar("RepresentativeSNILS"),
        tel: scalar("Phone"),
        email: scalar("Email"),
        date: scalar("RequestDate"),
        inv: scalar("UniqueID"),
        cad: scalar("CadastralNumber"),
        is_deposit,
        in_city: scalar("HasAreaInCity"),
        coordinate_system: scalar("CoordinateSystem"),
        coords: extract_coords(root),
        polygons: extract_polygons(root),
        deposit_info_list,
        is_10,
        test: options.test_mode,
        signer: options.signer.to_string(),
        generated_at: now,
    };

    debug!(
        unique_id = context.inv.as_deref().unwrap_or("-"),
        coords = context.coords.len(),
        polygons = context.polygons.len(),
        deposits = context.deposit_info_list.as_ref().map_or(0, Vec::len),
        "Extracted context"
    );
    Ok(context)
}

/// `false`, `0`, `no`, `нет` (any case) and empty are false; anything else
/// present is true.
///
/// Gates the deposit list, so `<DepositPresence>false</DepositPresence>`
/// yields no deposits even though the element is present and non-empty.
pub fn is_truthy(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    !matches!(v.as_str(), "" | "false" | "0" | "no" | "n" | "нет")
}

fn point(el: XmlElement<'_>) -> Option<Coordinate> {
    Some(Coordinate {
        latitude: el.find_first("Latitude")?.to_string(),
        longitude: el.find_first("Longitude")?.to_string(),
    })
}

fn extract_coords(root: XmlElement<'_>) -> Vec<String> {
    root.elements("Point")
        .filter_map(point)
        .map(|c| format!("{}, {}", c.latitude, c.longitude))
        .collect()
}

fn extract_polygons(root: XmlElement<'_>) -> Vec<Polygon> {
    let polygons: Vec<Polygon> = root
        .elements("Polygon")
        .map(|poly| Polygon {
            points: poly.elements("Point").filter_map(point).collect(),
        })
        .filter(|p| !p.points.is_empty())
        .collect();
    if !polygons.is_empty() {
        return polygons;
    }
    // Points without any Polygon wrapper form a single implicit polygon.
    let loose: Vec<Coordinate> = root.elements("Point").filter_map(point).collect();
    if loose.is_empty() {
        Vec::new()
    } else {
        vec![Polygon { points: loose }]
    }
}

fn extract_deposits(root: XmlElement<'_>, now: &str) -> Vec<DepositRecord> {
    root.elements("DepositInfo")
        .map(|deposit| DepositRecord {
            name: deposit.find_first("DepositName").map(str::to_string),
            cad_num: deposit.find_first("CadastreNumber").map(str::to_string),
            licenses: deposit.find_all("LicenseNumber").join(", "),
            last_change_date: deposit
                .find_first("last_change_date")
                .map_or_else(|| now.to_string(), str::to_string),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn options(required: &[String]) -> ExtractOptions<'_> {
        ExtractOptions {
            required_fields: required,
            test_mode: true,
            signer: "ТЕСТ",
            now: FixedOffset::east_opt(3 * 3600)
                .unwrap()
                .with_ymd_and_hms(2024, 5, 6, 7, 8, 9)
                .unwrap(),
        }
    }

    fn required() -> Vec<String> {
        vec!["UniqueID".to_string()]
    }

    fn deposits_xml(n: usize) -> String {
        let mut xml = String::from("<R><UniqueID>1</UniqueID><DepositPresence>true</DepositPresence>");
        for i in 0..n {
            xml.push_str(&format!(
                "<DepositInfo><DepositName>D{i}</DepositName><LicenseNumber>L{i}a</LicenseNumber><LicenseNumber>L{i}b</LicenseNumber></DepositInfo>"
            ));
        }
        xml.push_str("</R>");
        xml
    }

    #[test]
    fn missing_unique_id() {
        let doc = XmlDocument::parse_str("<R><FullName>X</FullName></R>").unwrap();
        let req = required();
        let err = extract(&doc, &options(&req)).unwrap_err();
        assert!(matches!(err, Xml2PdfError::MissingRequiredField { ref field } if field == "UniqueID"));
    }

    #[test]
    fn empty_unique_id_counts_as_missing() {
        let doc = XmlDocument::parse_str("<R><UniqueID>   </UniqueID></R>").unwrap();
        let req = required();
        assert!(extract(&doc, &options(&req)).is_err());
    }

    #[test]
    fn n_deposits_in_order() {
        for n in [1, 3, 10, 11] {
            let doc = XmlDocument::parse_str(&deposits_xml(n)).unwrap();
            let req = required();
            let ctx = extract(&doc, &options(&req)).unwrap();
            let deposits = ctx.deposit_info_list.unwrap();
            assert_eq!(deposits.len(), n);
            for (i, d) in deposits.iter().enumerate() {
                assert_eq!(d.name.as_deref(), Some(format!("D{i}").as_str()));
                assert_eq!(d.licenses, format!("L{i}a, L{i}b"));
                assert_eq!(d.last_change_date, "06.05.2024 07:08:09");
            }
            assert_eq!(ctx.is_10, n == 10);
        }
    }

    #[test]
    fn deposits_absent_without_presence_flag() {
        let xml = deposits_xml(2).replace("<DepositPresence>true</DepositPresence>", "");
        let doc = XmlDocument::parse_str(&xml).unwrap();
        let req = required();
        let ctx = extract(&doc, &options(&req)).unwrap();
        assert!(ctx.deposit_info_list.is_none());
        assert!(!ctx.is_10);

        let xml = deposits_xml(2).replace(">true<", ">false<");
        let doc = XmlDocument::parse_str(&xml).unwrap();
        let ctx = extract(&doc, &options(&req)).unwrap();
        assert!(ctx.deposit_info_list.is_none());
    }

    #[test]
    fn coordinates_require_both_parts() {
        let xml = "<R><UniqueID>1</UniqueID>\
            <Polygon><Point><Latitude>1</Latitude><Longitude>2</Longitude></Point>\
            <Point><Latitude>3</Latitude></Point></Polygon>\
            <Polygon><Point><Latitude>5</Latitude><Longitude>6</Longitude></Point></Polygon></R>";
        let doc = XmlDocument::parse_str(xml).unwrap();
        let req = required();
        let ctx = extract(&doc, &options(&req)).unwrap();
        assert_eq!(ctx.coords, vec!["1, 2", "5, 6"]);
        assert_eq!(ctx.polygons.len(), 2);
        assert_eq!(ctx.polygons[0].points.len(), 1);
    }

    #[test]
    fn loose_points_form_one_polygon() {
        let xml = "<R><UniqueID>1</UniqueID><Point><Latitude>1</Latitude><Longitude>2</Longitude></Point></R>";
        let doc = XmlDocument::parse_str(xml).unwrap();
        let req = required();
        let ctx = extract(&doc, &options(&req)).unwrap();
        assert_eq!(ctx.polygons.len(), 1);
    }

    #[test]
    fn serialises_with_template_keys() {
        let doc = XmlDocument::parse_str("<R><UniqueID>42</UniqueID><INN>7701</INN></R>").unwrap();
        let req = required();
        let ctx = extract(&doc, &options(&req)).unwrap();
        let value = serde_json::to_value(&ctx).unwrap();
        assert_eq!(value["inv"], "42");
        assert_eq!(value["inn"], "7701");
        assert!(value["name"].is_null());
        assert_eq!(value["test"], true);
    }

    #[test]
    fn truthiness() {
        assert!(is_truthy("true"));
        assert!(is_truthy("Да"));
        assert!(is_truthy("1"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy("FALSE"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("нет"));
        assert!(!is_truthy(" "));
    }
}
