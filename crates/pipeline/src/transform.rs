//! Per-feature normalization: reprojection, single-to-multi coercion and
//! attribute stringification.

use gdal::errors::GdalError;
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::vector::{Feature, FieldValue, Geometry, OGRwkbGeometryType};
use serde_json::{Map, Value};

use crate::error::ImportError;

/// Build the target reference with longitude/easting first.
pub fn target_srs(epsg: u32) -> Result<SpatialRef, ImportError> {
    let mut srs = SpatialRef::from_epsg(epsg)?;
    srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
    Ok(srs)
}

// ---------------------------------------------------------------------------
// Layer transform
// ---------------------------------------------------------------------------

/// Geometry pipeline for one layer. The coordinate transform, if any, is
/// built once and reused for every feature.
pub struct LayerTransform {
    transform: Option<CoordTransform>,
}

impl LayerTransform {
    /// Prepare the transform from `source` to `target`.
    ///
    /// A layer without a declared reference, or whose reference cannot be
    /// transformed to the target, keeps its coordinates. A layer already in
    /// the target reference is not transformed.
    pub fn for_layer(source: Option<SpatialRef>, target: &SpatialRef, layer_name: &str) -> Self {
        let transform = match source {
            None => {
                tracing::warn!(layer = layer_name, "Layer has no spatial reference, skipping reprojection");
                None
            }
            Some(source) if source == *target => None,
            Some(mut source) => {
                source.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
                match CoordTransform::new(&source, target) {
                    Ok(transform) => Some(transform),
                    Err(e) => {
                        tracing::warn!(layer = layer_name, error = %e, "No transformation to the target reference, skipping reprojection");
                        None
                    }
                }
            }
        };
        Self { transform }
    }

    /// Identity transform.
    pub fn identity() -> Self {
        Self { transform: None }
    }

    pub fn reprojects(&self) -> bool {
        self.transform.is_some()
    }

    /// Reproject a copy of `geometry` and coerce it to its multi-part type.
    /// The source geometry is left untouched.
    pub fn apply(&self, geometry: &Geometry) -> Result<Geometry, ImportError> {
        let mut geometry = geometry.clone();
        if let Some(transform) = &self.transform {
            geometry.transform_inplace(transform)?;
        }
        Ok(normalize_geometry(geometry)?)
    }
}

// ---------------------------------------------------------------------------
// Geometry type normalization
// ---------------------------------------------------------------------------

/// Multi-part counterpart of a single-part type, keeping Z/M flags.
pub fn multi_type_for(geometry_type: OGRwkbGeometryType::Type) -> Option<OGRwkbGeometryType::Type> {
    use OGRwkbGeometryType::*;
    let multi = match geometry_type {
        wkbPoint => wkbMultiPoint,
        wkbPoint25D => wkbMultiPoint25D,
        wkbPointM => wkbMultiPointM,
        wkbPointZM => wkbMultiPointZM,
        wkbLineString => wkbMultiLineString,
        wkbLineString25D => wkbMultiLineString25D,
        wkbLineStringM => wkbMultiLineStringM,
        wkbLineStringZM => wkbMultiLineStringZM,
        wkbPolygon => wkbMultiPolygon,
        wkbPolygon25D => wkbMultiPolygon25D,
        wkbPolygonM => wkbMultiPolygonM,
        wkbPolygonZM => wkbMultiPolygonZM,
        _ => return None,
    };
    Some(multi)
}

/// Wrap single points, lines and polygons in their multi-part type.
/// Everything else is returned unchanged.
pub fn normalize_geometry(geometry: Geometry) -> Result<Geometry, GdalError> {
    match multi_type_for(geometry.geometry_type()) {
        Some(multi_type) => {
            let mut multi = Geometry::empty(multi_type)?;
            multi.add_geometry(geometry)?;
            Ok(multi)
        }
        None => Ok(geometry),
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// Text form of one field value, as stored in the attribute blob.
///
/// Every scalar is written as a string. Dates use the OGR text layout
/// (`YYYY/MM/DD`), reals keep a fractional part and lists render as
/// bracketed sequences.
pub fn field_value_to_text(value: &FieldValue) -> String {
    match value {
        FieldValue::IntegerValue(v) => v.to_string(),
        FieldValue::Integer64Value(v) => v.to_string(),
        FieldValue::RealValue(v) => real_to_text(*v),
        FieldValue::StringValue(s) => s.clone(),
        FieldValue::IntegerListValue(vs) => list_to_text(vs.iter().map(i32::to_string)),
        FieldValue::Integer64ListValue(vs) => list_to_text(vs.iter().map(i64::to_string)),
        FieldValue::RealListValue(vs) => list_to_text(vs.iter().map(|v| real_to_text(*v))),
        FieldValue::StringListValue(vs) => list_to_text(vs.iter().map(|s| format!("'{s}'"))),
        FieldValue::DateValue(d) => d.format("%Y/%m/%d").to_string(),
        FieldValue::DateTimeValue(dt) => dt.format("%Y/%m/%d %H:%M:%S").to_string(),
    }
}

fn real_to_text(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "inf" } else { "-inf" };
        text.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

fn list_to_text(items: impl Iterator<Item = String>) -> String {
    format!("[{}]", items.collect::<Vec<_>>().join(", "))
}

/// Build the attribute object from `(name, value)` pairs; unset fields are null.
pub fn attributes_to_json<I>(fields: I) -> Value
where
    I: IntoIterator<Item = (String, Option<FieldValue>)>,
{
    let map: Map<String, Value> = fields
        .into_iter()
        .map(|(name, value)| {
            let value = value
                .as_ref()
                .map(|v| Value::String(field_value_to_text(v)))
                .unwrap_or(Value::Null);
            (name, value)
        })
        .collect();
    Value::Object(map)
}

/// Attribute object of a GDAL feature.
///
/// GDAL hands field text over already decoded; byte sequences that are not
/// valid UTF-8 arrive as U+FFFD.
pub fn feature_attributes(feature: &Feature<'_>) -> Value {
    attributes_to_json(feature.fields())
}
