use crate::sync::source::{CsvRow, SourceRecord};
use crate::sync::state::AccessPoints;
use crate::sync::util::{creator_name, split_terms};
use chrono::NaiveDateTime;
use serde_json::{Value, json};

const SINGLEPART_NOTES: [&str; 5] = [
    "abstract",
    "materialspec",
    "physdesc",
    "physfacet",
    "physloc",
];
const SOURCE_LABEL: &str = "BC Museum Archives";
const UNDATED: &str = "n.d.";

/// Inputs a transform needs besides the record itself.
#[derive(Debug, Clone)]
pub struct MappingContext {
    pub public_url: String,
    pub now: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappedRecord {
    pub id_0: String,
    pub resource: Value,
    pub access_points: AccessPoints,
}

fn make_note(note_type: &str, content: Option<&str>) -> Option<Value> {
    let content = content.map(str::trim).filter(|c| !c.is_empty())?;
    if SINGLEPART_NOTES.contains(&note_type) {
        return Some(json!({
            "jsonmodel_type": "note_singlepart",
            "type": note_type,
            "publish": true,
            "content": [content],
        }));
    }
    Some(json!({
        "jsonmodel_type": "note_multipart",
        "type": note_type,
        "publish": true,
        "subnotes": [{
            "jsonmodel_type": "note_text",
            "content": content,
            "publish": true,
        }],
    }))
}

fn build_extents(extent: Option<&str>) -> Value {
    match extent.map(str::trim).filter(|e| !e.is_empty()) {
        Some(details) => json!([{
            "number": "1",
            "extent_type": "Entry",
            "portion": "whole",
            "physical_details": details,
        }]),
        None => json!([{"number": "0", "extent_type": "volumes", "portion": "whole"}]),
    }
}

fn origin_note(href: &str, reference: &str, title: &str, ctx: &MappingContext) -> String {
    format!(
        "<extref target='_blank' href='{href}'>{reference} - {title}</extref><br />\
<emph>Source: {SOURCE_LABEL}</emph><br /><emph>Indexed: </emph><date>{}</date>",
        ctx.now.format("%Y-%m-%d")
    )
}

struct Descriptive<'a> {
    id_0: &'a str,
    title: &'a str,
    level: Option<&'a str>,
    publication_status: Option<&'a str>,
    date_expression: &'a str,
    extent: Option<&'a str>,
    notes: Vec<Value>,
}

fn build_resource(d: Descriptive<'_>, ctx: &MappingContext) -> Value {
    let level = d
        .level
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or("series")
        .to_lowercase();
    let publish = d
        .publication_status
        .is_some_and(|s| s.trim().eq_ignore_ascii_case("published"));
    json!({
        "title": d.title,
        "id_0": d.id_0,
        "level": level,
        "publish": publish,
        "repository_processing_note": format!(
            "Data acquired via automated script on {}. Please visit the {SOURCE_LABEL} access catalogue for the current and authoritative description.",
            ctx.now.format("%Y-%m-%d-%H-%M")
        ),
        "dates": [{
            "label": "creation",
            "date_type": "inclusive",
            "expression": d.date_expression,
        }],
        "extents": build_extents(d.extent),
        "lang_materials": [
            {"language_and_script": {"language": "und", "script": "Latn"}}
        ],
        "finding_aid_language": "eng",
        "finding_aid_script": "Zyyy",
        "notes": d.notes,
    })
}

fn str_field<'a>(detail: &'a Value, field: &str) -> Option<&'a str> {
    detail
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn string_list(detail: &Value, field: &str) -> Vec<String> {
    let Some(items) = detail.get(field).and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.trim()),
            other => other.get("name").and_then(Value::as_str).map(str::trim),
        })
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Creator records carry the agent's authorised form of name; dates of
/// existence are not carried over.
fn creator_names(detail: &Value) -> Vec<String> {
    let Some(items) = detail.get("creators").and_then(Value::as_array) else {
        return Vec::new();
    };
    items.iter().filter_map(creator_name).collect()
}

pub fn map_atom(detail: &Value, slug: &str, ctx: &MappingContext) -> MappedRecord {
    let id_0 = str_field(detail, "reference_code").unwrap_or(slug);
    let title = str_field(detail, "title").unwrap_or("Untitled");
    let date_expression = detail
        .get("dates")
        .and_then(Value::as_array)
        .and_then(|dates| dates.first())
        .and_then(|date| str_field(date, "date"))
        .unwrap_or(UNDATED);
    let href = format!("{}/{slug}", ctx.public_url);
    let notes = [
        make_note("scopecontent", str_field(detail, "scope_and_content")),
        make_note("accessrestrict", str_field(detail, "conditions_governing_access")),
        make_note("originalsloc", Some(origin_note(&href, id_0, title, ctx).as_str())),
    ]
    .into_iter()
    .flatten()
    .collect();

    let resource = build_resource(
        Descriptive {
            id_0,
            title,
            level: str_field(detail, "level_of_description"),
            publication_status: str_field(detail, "publication_status"),
            date_expression,
            extent: str_field(detail, "extent_and_medium"),
            notes,
        },
        ctx,
    );

    MappedRecord {
        id_0: id_0.to_string(),
        resource,
        access_points: AccessPoints {
            subject: string_list(detail, "subject_access_points"),
            place: string_list(detail, "place_access_points"),
            name: string_list(detail, "name_access_points"),
            creator: creator_names(detail),
        },
    }
}

fn cell<'a>(row: &'a CsvRow, column: &str) -> Option<&'a str> {
    row.get(column).map(|v| v.trim()).filter(|v| !v.is_empty())
}

fn cell_terms(row: &CsvRow, column: &str) -> Vec<String> {
    cell(row, column).map(split_terms).unwrap_or_default()
}

pub fn map_csv(row: &CsvRow, position: u64, ctx: &MappingContext) -> MappedRecord {
    let fallback = position.to_string();
    let id_0 = cell(row, "referenceCode")
        .or_else(|| cell(row, "identifier"))
        .unwrap_or(&fallback);
    let title = cell(row, "title").unwrap_or("Untitled");
    let date_expression = cell_terms(row, "eventDates")
        .into_iter()
        .chain(cell_terms(row, "eventStartDates"))
        .next()
        .unwrap_or_else(|| UNDATED.to_string());
    let reference = cell(row, "referenceCode").unwrap_or_default();
    let href = format!("{}/informationobject/browse?sq0={reference}", ctx.public_url);
    let notes = [
        make_note("scopecontent", cell(row, "scopeAndContent")),
        make_note("accessrestrict", cell(row, "accessConditions")),
        make_note("originalsloc", Some(origin_note(&href, reference, title, ctx).as_str())),
    ]
    .into_iter()
    .flatten()
    .collect();

    let resource = build_resource(
        Descriptive {
            id_0,
            title,
            level: cell(row, "levelOfDescription"),
            publication_status: cell(row, "publicationStatus"),
            date_expression: &date_expression,
            extent: cell(row, "extentAndMedium"),
            notes,
        },
        ctx,
    );

    MappedRecord {
        id_0: id_0.to_string(),
        resource,
        access_points: AccessPoints {
            subject: cell_terms(row, "subjectAccessPoints"),
            place: cell_terms(row, "placeAccessPoints"),
            name: cell_terms(row, "nameAccessPoints"),
            creator: cell_terms(row, "eventActors"),
        },
    }
}

pub fn map_record(record: &SourceRecord, ctx: &MappingContext) -> MappedRecord {
    match record {
        SourceRecord::Atom { slug, detail } => map_atom(detail, slug, ctx),
        SourceRecord::Csv { position, row } => map_csv(row, *position, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ctx() -> MappingContext {
        MappingContext {
            public_url: "https://catalogue.example".to_string(),
            now: NaiveDate::from_ymd_opt(2026, 3, 14)
                .and_then(|d| d.and_hms_opt(9, 30, 0))
                .expect("valid timestamp"),
        }
    }

    fn row(pairs: &[(&str, &str)]) -> CsvRow {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn atom_detail_maps_fields_and_access_points() {
        let detail = json!({
            "reference_code": "GR-0001",
            "title": "Fisheries records",
            "level_of_description": "Fonds",
            "publication_status": "Published",
            "scope_and_content": "Correspondence about salmon runs.",
            "extent_and_medium": "2.5 m of textual records",
            "dates": [{"date": "1890-1920"}],
            "subject_access_points": ["Fishing", ""],
            "place_access_points": ["Fraser River (B.C.)"],
            "name_access_points": ["Dept. of Fisheries"],
            "creators": [{
                "authorized_form_of_name": "British Columbia. Fisheries Commission",
                "dates_of_existence": "1901-1947"
            }]
        });

        let mapped = map_atom(&detail, "gr-0001", &ctx());

        assert_eq!(mapped.id_0, "GR-0001");
        assert_eq!(mapped.resource["level"], "fonds");
        assert_eq!(mapped.resource["publish"], true);
        assert_eq!(mapped.resource["dates"][0]["expression"], "1890-1920");
        assert_eq!(mapped.resource["extents"][0]["extent_type"], "Entry");
        assert_eq!(mapped.resource["notes"].as_array().map(Vec::len), Some(2));
        let origin = mapped.resource["notes"][1]["subnotes"][0]["content"]
            .as_str()
            .expect("origin note");
        assert!(origin.contains("href='https://catalogue.example/gr-0001'"));
        assert!(origin.contains("<date>2026-03-14</date>"));
        assert_eq!(mapped.access_points.subject, vec!["Fishing"]);
        assert_eq!(
            mapped.access_points.creator,
            vec!["British Columbia. Fisheries Commission"]
        );
    }

    #[test]
    fn atom_detail_without_reference_code_falls_back_to_slug() {
        let mapped = map_atom(&json!({}), "untitled-item-7", &ctx());
        assert_eq!(mapped.id_0, "untitled-item-7");
        assert_eq!(mapped.resource["title"], "Untitled");
        assert_eq!(mapped.resource["level"], "series");
        assert_eq!(mapped.resource["publish"], false);
        assert_eq!(mapped.resource["dates"][0]["expression"], "n.d.");
        assert_eq!(mapped.resource["extents"][0]["number"], "0");
    }

    #[test]
    fn csv_row_maps_pipe_delimited_terms_and_first_valid_date() {
        let mapped = map_csv(
            &row(&[
                ("referenceCode", "GR-0002"),
                ("title", "Lands correspondence"),
                ("eventDates", "NULL|"),
                ("eventStartDates", "1912|1915"),
                ("subjectAccessPoints", "Fishing|NULL|Logging"),
                ("placeAccessPoints", "NULL"),
                ("eventActors", "Dept. of Lands|Surveyor General"),
            ]),
            2,
            &ctx(),
        );

        assert_eq!(mapped.id_0, "GR-0002");
        assert_eq!(mapped.resource["dates"][0]["expression"], "1912");
        assert_eq!(mapped.access_points.subject, vec!["Fishing", "Logging"]);
        assert!(mapped.access_points.place.is_empty());
        assert_eq!(mapped.access_points.creator, vec!["Dept. of Lands", "Surveyor General"]);
    }

    #[test]
    fn csv_row_identifier_falls_back_to_position() {
        let mapped = map_csv(&row(&[("title", "Loose item")]), 17, &ctx());
        assert_eq!(mapped.id_0, "17");

        let mapped = map_csv(&row(&[("identifier", "ITEM-9")]), 18, &ctx());
        assert_eq!(mapped.id_0, "ITEM-9");
    }

    #[test]
    fn singlepart_note_types_use_content_array() {
        let note = make_note("physloc", Some("Vault 3")).expect("note");
        assert_eq!(note["jsonmodel_type"], "note_singlepart");
        assert_eq!(note["content"][0], "Vault 3");
        assert!(make_note("scopecontent", Some("   ")).is_none());
    }
}
