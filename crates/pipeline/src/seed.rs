//! Representation mapping seed files.
//!
//! CSV with the header `esquema,classe,grupo_representacao`. The group may
//! be the stored code (`railway`) or its display label (`Ferrovia`).

use std::io::Read;
use std::path::Path;

use geoimport_core::representation::RepresentationGroup;
use geoimport_db::models::representation_mapping::UpsertRepresentationMapping;
use geoimport_db::repositories::RepresentationMappingRepo;
use serde::Deserialize;
use sqlx::PgPool;

use crate::error::ImportError;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SeedRecord {
    esquema: Option<String>,
    classe: Option<String>,
    grupo_representacao: Option<String>,
}

/// Parsed seed file.
#[derive(Debug, Default)]
pub struct MappingSeed {
    pub mappings: Vec<UpsertRepresentationMapping>,
    /// Rows ignored for a missing field or an unknown group.
    pub skipped: usize,
}

/// Parse seed rows from CSV. Structural CSV errors abort; bad rows are
/// skipped with a warning.
pub fn read_mapping_csv<R: Read>(reader: R) -> Result<MappingSeed, ImportError> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut seed = MappingSeed::default();
    for (index, record) in csv.deserialize::<SeedRecord>().enumerate() {
        let line = index + 2;
        let record = record?;

        let (Some(schema), Some(class_name), Some(group)) = (
            non_empty(record.esquema),
            non_empty(record.classe),
            non_empty(record.grupo_representacao),
        ) else {
            tracing::warn!(line, "Seed row with missing field, skipping");
            seed.skipped += 1;
            continue;
        };

        match RepresentationGroup::parse(&group) {
            Ok(group) => seed.mappings.push(UpsertRepresentationMapping {
                schema_label: schema,
                class_name,
                representation_group: group.as_str().to_string(),
            }),
            Err(e) => {
                tracing::warn!(line, error = %e, "Seed row skipped");
                seed.skipped += 1;
            }
        }
    }
    Ok(seed)
}

/// Read a seed file and upsert its rows in one transaction.
pub async fn seed_mappings(pool: &PgPool, path: &Path) -> Result<MappingSeed, ImportError> {
    let seed = read_mapping_csv(std::fs::File::open(path)?)?;
    let written = RepresentationMappingRepo::bulk_upsert(pool, &seed.mappings).await?;
    tracing::info!(path = %path.display(), written, skipped = seed.skipped, "Representation mappings seeded");
    Ok(seed)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_codes_and_labels() {
        let csv = "esquema,classe,grupo_representacao\n\
                   EDGV 3.0,TRA_Trecho_Ferroviario_L,railway\n\
                   EDGV 3.0, HID_Trecho_Drenagem_L ,Drenagem\n\
                   EDGV 2.1.3,LIM_Municipio_A,Limite Administrativo\n";
        let seed = read_mapping_csv(csv.as_bytes()).unwrap();
        assert_eq!(seed.skipped, 0);
        let groups: Vec<_> = seed
            .mappings
            .iter()
            .map(|m| (m.class_name.as_str(), m.representation_group.as_str()))
            .collect();
        assert_eq!(
            groups,
            vec![
                ("TRA_Trecho_Ferroviario_L", "railway"),
                ("HID_Trecho_Drenagem_L", "drainage"),
                ("LIM_Municipio_A", "administrative_boundary"),
            ]
        );
    }

    #[test]
    fn test_skips_incomplete_and_unknown_rows() {
        let csv = "esquema,classe,grupo_representacao\n\
                   EDGV 3.0,,railway\n\
                   EDGV 3.0,VEG_Campo_A,Hidrovia\n\
                   EDGV 3.0,VEG_Campo_A,vegetation\n";
        let seed = read_mapping_csv(csv.as_bytes()).unwrap();
        assert_eq!(seed.skipped, 2);
        assert_eq!(seed.mappings.len(), 1);
        assert_eq!(seed.mappings[0].representation_group, "vegetation");
    }

    #[test]
    fn test_missing_schema_column_skips_everything() {
        let csv = "classe,grupo_representacao\nVEG_Campo_A,vegetation\n";
        let seed = read_mapping_csv(csv.as_bytes()).unwrap();
        assert!(seed.mappings.is_empty());
        assert_eq!(seed.skipped, 1);
    }
}
