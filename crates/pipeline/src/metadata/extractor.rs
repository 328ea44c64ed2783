//! ISO 19115/19139 field extraction.
//!
//! Each field is looked up independently; a miss leaves that field at its
//! default and never affects the others. Unreadable or malformed documents
//! yield [`ProductMetadata::default`].

use chrono::NaiveDate;
use geoimport_core::metadata::{format_scale, ProductMetadata};
use geoimport_core::schema::find_version;
use roxmltree::Node;

use super::locator::MetadataLocator;
use super::xml::{
    children_named, descendants_named, document_text, gco, gmd, gmx, is_named, parse_document,
    text, Name, GCO_NS, GMD_NS, GMX_NS,
};

/// Elements that hold free text in ISO 19139.
const FREE_TEXT: &[Name] = &[
    (GCO_NS, "CharacterString"),
    (GMX_NS, "Anchor"),
    (GMD_NS, "LocalisedCharacterString"),
];

/// Extract metadata through a locator. `None` yields the defaults.
pub fn extract_metadata(locator: Option<&MetadataLocator>) -> ProductMetadata {
    let Some(locator) = locator else {
        return ProductMetadata::default();
    };

    match locator.read_bytes() {
        Ok(bytes) => extract_from_bytes(&bytes),
        Err(e) => {
            tracing::warn!(locator = %locator, error = %e, "Cannot read metadata document, using defaults");
            ProductMetadata::default()
        }
    }
}

/// Extract metadata from a raw XML document.
pub fn extract_from_bytes(bytes: &[u8]) -> ProductMetadata {
    let source = document_text(bytes);
    let mut repaired = None;
    match parse_document(&source, &mut repaired) {
        Ok(document) => extract_from_document(document.root_element()),
        Err(e) => {
            tracing::warn!(error = %e, "Malformed metadata document, using defaults");
            ProductMetadata::default()
        }
    }
}

/// Extract metadata from the root element of a parsed document.
pub fn extract_from_document(root: Node<'_, '_>) -> ProductMetadata {
    let mut metadata = ProductMetadata::default();

    if let Some(scale) = scale_text(root).and_then(format_scale) {
        metadata.scale = scale;
    }

    metadata.product_date = date_text(root).and_then(|raw| {
        let parsed = parse_date(raw);
        if parsed.is_none() {
            tracing::warn!(value = raw, "Unparsable product date in metadata");
        }
        parsed
    });

    if let Some(identifier) = identifier_text(root) {
        metadata.identifier = identifier.to_string();
    }

    if let Some(schema) = catalogue_citation(root).or_else(|| scan_schema_text(root)) {
        metadata.schema_text = schema;
    }

    tracing::debug!(
        scale = %metadata.scale,
        date = ?metadata.product_date,
        schema = %metadata.schema_text,
        identifier = %metadata.identifier,
        "Extracted metadata"
    );
    metadata
}

/// Denominator of the equivalent scale.
fn scale_text<'a>(root: Node<'a, '_>) -> Option<&'a str> {
    descendants_named(root, gmd("equivalentScale"))
        .flat_map(|n| descendants_named(n, gco("Integer")))
        .find_map(text)
        .or_else(|| {
            descendants_named(root, gmd("denominator"))
                .flat_map(|n| children_named(n, gco("Integer")))
                .find_map(text)
        })
}

/// First citation date, then the record's date stamp.
fn date_text<'a, 'input: 'a>(root: Node<'a, 'input>) -> Option<&'a str> {
    let date_or_time = |n: Node<'a, 'input>| {
        children_named(n, gco("Date"))
            .chain(children_named(n, gco("DateTime")))
            .find_map(text)
    };
    descendants_named(root, gmd("CI_Date"))
        .flat_map(|n| children_named(n, gmd("date")))
        .find_map(date_or_time)
        .or_else(|| descendants_named(root, gmd("dateStamp")).find_map(date_or_time))
}

fn identifier_text<'a>(root: Node<'a, '_>) -> Option<&'a str> {
    [gco("CharacterString"), gmx("Anchor")].into_iter().find_map(|name| {
        descendants_named(root, gmd("fileIdentifier"))
            .flat_map(|n| descendants_named(n, name))
            .find_map(text)
    })
}

/// `YYYY-MM-DD`, optionally followed by a time part.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Citations that may name the feature catalogue, most specific first.
fn catalogue_citations<'a, 'input: 'a>(
    root: Node<'a, 'input>,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    let citation = gmd("CI_Citation");
    descendants_named(root, gmd("featureCatalogueCitation"))
        .flat_map(move |n| children_named(n, citation))
        .chain(
            descendants_named(root, gmd("MD_FeatureCatalogueDescription"))
                .flat_map(move |n| descendants_named(n, citation)),
        )
        .chain(
            descendants_named(root, gmd("contentInfo"))
                .flat_map(move |n| descendants_named(n, citation)),
        )
        .chain(
            descendants_named(root, gmd("applicationSchemaInfo"))
                .flat_map(move |n| descendants_named(n, citation)),
        )
}

fn citation_field<'a>(citation: Node<'a, '_>, field: &'static str) -> Option<&'a str> {
    children_named(citation, gmd(field)).find_map(|n| {
        children_named(n, gco("CharacterString"))
            .chain(children_named(n, gmx("Anchor")))
            .find_map(text)
    })
}

/// "<title> <edition>" of the first catalogue citation carrying both.
fn catalogue_citation(root: Node<'_, '_>) -> Option<String> {
    catalogue_citations(root).find_map(|citation| {
        let title = citation_field(citation, "title")?;
        let edition = citation_field(citation, "edition")?;
        Some(format!("{title} {edition}"))
    })
}

/// Free-text value that mentions the schema. A text carrying a version
/// marker wins over an earlier one that only names the schema.
fn scan_schema_text(root: Node<'_, '_>) -> Option<String> {
    let mut first_mention = None;
    for candidate in root
        .descendants()
        .filter(|n| FREE_TEXT.iter().any(|name| is_named(n, *name)))
        .filter_map(text)
        .filter(|t| t.to_lowercase().contains("edgv"))
    {
        if find_version(candidate).is_some() {
            return Some(candidate.to_string());
        }
        first_mention.get_or_insert(candidate);
    }
    first_mention.map(str::to_string)
}

#[cfg(test)]
mod tests {
    use geoimport_core::metadata::{IDENTIFIER_UNSPECIFIED, SCALE_UNSPECIFIED};
    use geoimport_core::schema::{classify_schema, SchemaLabel};
    use std::path::Path;

    use super::*;

    fn doc(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gmd:MD_Metadata xmlns:gmd="http://www.isotc211.org/2005/gmd"
                 xmlns:gco="http://www.isotc211.org/2005/gco"
                 xmlns:gmx="http://www.isotc211.org/2005/gmx">{body}</gmd:MD_Metadata>"#
        )
    }

    const FULL: &str = r#"
  <gmd:fileIdentifier><gco:CharacterString>9b1f-2c</gco:CharacterString></gmd:fileIdentifier>
  <gmd:identificationInfo><gmd:MD_DataIdentification>
    <gmd:citation><gmd:CI_Citation>
      <gmd:title><gco:CharacterString>Carta Topográfica</gco:CharacterString></gmd:title>
      <gmd:date><gmd:CI_Date>
        <gmd:date><gco:Date>2019-11-04</gco:Date></gmd:date>
      </gmd:CI_Date></gmd:date>
    </gmd:CI_Citation></gmd:citation>
    <gmd:spatialResolution><gmd:MD_Resolution><gmd:equivalentScale>
      <gmd:MD_RepresentativeFraction><gmd:denominator>
        <gco:Integer>50000</gco:Integer>
      </gmd:denominator></gmd:MD_RepresentativeFraction>
    </gmd:equivalentScale></gmd:MD_Resolution></gmd:spatialResolution>
  </gmd:MD_DataIdentification></gmd:identificationInfo>
  <gmd:contentInfo><gmd:MD_FeatureCatalogueDescription>
    <gmd:featureCatalogueCitation><gmd:CI_Citation>
      <gmd:title><gco:CharacterString>ET-EDGV</gco:CharacterString></gmd:title>
      <gmd:edition><gco:CharacterString>3.0</gco:CharacterString></gmd:edition>
    </gmd:CI_Citation></gmd:featureCatalogueCitation>
  </gmd:MD_FeatureCatalogueDescription></gmd:contentInfo>"#;

    #[test]
    fn test_full_document() {
        let md = extract_from_bytes(doc(FULL).as_bytes());
        assert_eq!(md.scale, "1:50000");
        assert_eq!(md.product_date, NaiveDate::from_ymd_opt(2019, 11, 4));
        assert_eq!(md.identifier, "9b1f-2c");
        assert_eq!(md.schema_text, "ET-EDGV 3.0");
        assert_eq!(classify_schema(&md.schema_text, Path::new("x.zip")), SchemaLabel::Edgv30);
    }

    #[test]
    fn test_fields_default_independently() {
        let body = r#"<gmd:fileIdentifier><gco:CharacterString>only-id</gco:CharacterString></gmd:fileIdentifier>"#;
        let md = extract_from_bytes(doc(body).as_bytes());
        assert_eq!(md.identifier, "only-id");
        assert_eq!(md.scale, SCALE_UNSPECIFIED);
        assert_eq!(md.product_date, None);
        assert_eq!(md.schema_text, "EDGV");
    }

    #[test]
    fn test_schema_found_in_free_text_abstract() {
        let body = r#"
  <gmd:identificationInfo><gmd:MD_DataIdentification>
    <gmd:abstract><gco:CharacterString>Produto vetorial estruturado segundo a EDGV 2.1.3 da DSG.</gco:CharacterString></gmd:abstract>
  </gmd:MD_DataIdentification></gmd:identificationInfo>"#;
        let md = extract_from_bytes(doc(body).as_bytes());
        assert!(md.schema_text.contains("EDGV 2.1.3"));
        assert_eq!(
            classify_schema(&md.schema_text, Path::new("carta.zip")),
            SchemaLabel::Edgv213
        );
    }

    #[test]
    fn test_versioned_abstract_wins_over_earlier_title() {
        let body = r#"
  <gmd:identificationInfo><gmd:MD_DataIdentification>
    <gmd:citation><gmd:CI_Citation>
      <gmd:title><gco:CharacterString>Carta Topografica EDGV</gco:CharacterString></gmd:title>
    </gmd:CI_Citation></gmd:citation>
    <gmd:abstract><gco:CharacterString>Produto vetorial estruturado segundo a EDGV 2.1.3 da DSG.</gco:CharacterString></gmd:abstract>
  </gmd:MD_DataIdentification></gmd:identificationInfo>"#;
        let md = extract_from_bytes(doc(body).as_bytes());
        assert_eq!(
            classify_schema(&md.schema_text, Path::new("carta.zip")),
            SchemaLabel::Edgv213
        );
    }

    #[test]
    fn test_unversioned_mention_used_when_nothing_else() {
        let body = r#"
  <gmd:identificationInfo><gmd:MD_DataIdentification>
    <gmd:citation><gmd:CI_Citation>
      <gmd:title><gco:CharacterString>Carta Topografica EDGV</gco:CharacterString></gmd:title>
    </gmd:CI_Citation></gmd:citation>
    <gmd:abstract><gco:CharacterString>Levantamento de 2014.</gco:CharacterString></gmd:abstract>
  </gmd:MD_DataIdentification></gmd:identificationInfo>"#;
        let md = extract_from_bytes(doc(body).as_bytes());
        assert_eq!(md.schema_text, "Carta Topografica EDGV");
    }

    #[test]
    fn test_undeclared_entity_keeps_other_fields() {
        let body = r#"
  <gmd:fileIdentifier><gco:CharacterString>9b1f-2c</gco:CharacterString></gmd:fileIdentifier>
  <gmd:identificationInfo><gmd:MD_DataIdentification>
    <gmd:abstract><gco:CharacterString>Carta&nbsp;EDGV 3.0</gco:CharacterString></gmd:abstract>
  </gmd:MD_DataIdentification></gmd:identificationInfo>"#;
        let md = extract_from_bytes(doc(body).as_bytes());
        assert_eq!(md.identifier, "9b1f-2c");
        assert_eq!(md.schema_text, "Carta&nbsp;EDGV 3.0");
    }

    #[test]
    fn test_citation_with_anchor_title() {
        let body = r#"
  <gmd:contentInfo><gmd:MD_FeatureCatalogueDescription>
    <gmd:featureCatalogueCitation><gmd:CI_Citation>
      <gmd:title><gmx:Anchor xlink:href="x" xmlns:xlink="http://www.w3.org/1999/xlink">EDGV</gmx:Anchor></gmd:title>
      <gmd:edition><gco:CharacterString>2.1.3</gco:CharacterString></gmd:edition>
    </gmd:CI_Citation></gmd:featureCatalogueCitation>
  </gmd:MD_FeatureCatalogueDescription></gmd:contentInfo>"#;
        let md = extract_from_bytes(doc(body).as_bytes());
        assert_eq!(md.schema_text, "EDGV 2.1.3");
    }

    #[test]
    fn test_datetime_fallback() {
        let body = r#"<gmd:dateStamp><gco:DateTime>2021-03-09T12:00:00</gco:DateTime></gmd:dateStamp>"#;
        let md = extract_from_bytes(doc(body).as_bytes());
        assert_eq!(md.product_date, NaiveDate::from_ymd_opt(2021, 3, 9));
    }

    #[test]
    fn test_bad_date_is_absent() {
        let body = r#"<gmd:dateStamp><gco:Date>ontem</gco:Date></gmd:dateStamp>"#;
        assert_eq!(extract_from_bytes(doc(body).as_bytes()).product_date, None);
    }

    #[test]
    fn test_malformed_document_yields_defaults() {
        let md = extract_from_bytes(b"<gmd:MD_Metadata><unclosed>");
        assert_eq!(md, ProductMetadata::default());
    }

    #[test]
    fn test_missing_locator_yields_defaults() {
        let md = extract_metadata(None);
        assert_eq!(md.scale, SCALE_UNSPECIFIED);
        assert_eq!(md.product_date, None);
        assert_eq!(md.schema_text, "EDGV");
        assert_eq!(md.identifier, IDENTIFIER_UNSPECIFIED);
    }

    #[test]
    fn test_unreadable_locator_yields_defaults() {
        let locator = MetadataLocator::File("/nonexistent/metadata.xml".into());
        assert_eq!(extract_metadata(Some(&locator)), ProductMetadata::default());
    }
}
