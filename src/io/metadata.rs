use crate::types::{BoundingBox, BurnError, BurnResult, Sensor};
use chrono::NaiveDate;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::path::Path;

/// Collection-2 product identifier, e.g. `LC08_L2SP_045011_20150720_20200908_02_T1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductId {
    pub sensor: Sensor,
    /// `L2SP`, `L2SR`, `L1TP`, ...
    pub processing_level: String,
    pub wrs_path: u16,
    pub wrs_row: u16,
    pub acquired: NaiveDate,
    pub processed: NaiveDate,
    pub collection: u8,
    /// `T1`, `T2` or `RT`
    pub tier: String,
}

const PRODUCT_ID_PATTERN: &str =
    r"^(L[CTEMO]0[4-9])_(L[12][A-Z]{2})_(\d{3})(\d{3})_(\d{8})_(\d{8})_(\d{2})_(T1|T2|RT)$";

fn parse_compact_date(s: &str) -> BurnResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .map_err(|e| BurnError::Metadata(format!("invalid date '{}': {}", s, e)))
}

impl ProductId {
    pub fn parse(id: &str) -> BurnResult<Self> {
        let pattern = regex::Regex::new(PRODUCT_ID_PATTERN)
            .map_err(|e| BurnError::Metadata(format!("product id pattern: {}", e)))?;
        let caps = pattern
            .captures(id.trim())
            .ok_or_else(|| BurnError::Metadata(format!("not a Landsat product id: '{}'", id)))?;
        let field = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();

        let sensor = Sensor::from_identifier(field(1))
            .ok_or_else(|| BurnError::Metadata(format!("unsupported sensor '{}'", field(1))))?;
        let number = |i: usize| {
            field(i)
                .parse::<u16>()
                .map_err(|e| BurnError::Metadata(format!("'{}' in {}: {}", field(i), id, e)))
        };

        Ok(Self {
            sensor,
            processing_level: field(2).to_string(),
            wrs_path: number(3)?,
            wrs_row: number(4)?,
            acquired: parse_compact_date(field(5))?,
            processed: parse_compact_date(field(6))?,
            collection: number(7)? as u8,
            tier: field(8).to_string(),
        })
    }
}

/// `*_MTL.xml` document, only the groups the pipeline reads
#[derive(Debug, Deserialize)]
pub struct MtlDocument {
    #[serde(rename = "PRODUCT_CONTENTS")]
    pub product_contents: ProductContents,
    #[serde(rename = "IMAGE_ATTRIBUTES")]
    pub image_attributes: ImageAttributes,
    #[serde(rename = "PROJECTION_ATTRIBUTES")]
    pub projection_attributes: ProjectionAttributes,
}

#[derive(Debug, Deserialize)]
pub struct ProductContents {
    #[serde(rename = "LANDSAT_PRODUCT_ID")]
    pub landsat_product_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ImageAttributes {
    #[serde(rename = "SPACECRAFT_ID")]
    pub spacecraft_id: String,
    #[serde(rename = "DATE_ACQUIRED")]
    pub date_acquired: String,
    #[serde(rename = "CLOUD_COVER", default)]
    pub cloud_cover: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectionAttributes {
    #[serde(rename = "CORNER_UL_PROJECTION_X_PRODUCT")]
    pub ul_x: f64,
    #[serde(rename = "CORNER_UL_PROJECTION_Y_PRODUCT")]
    pub ul_y: f64,
    #[serde(rename = "CORNER_UR_PROJECTION_X_PRODUCT")]
    pub ur_x: f64,
    #[serde(rename = "CORNER_UR_PROJECTION_Y_PRODUCT")]
    pub ur_y: f64,
    #[serde(rename = "CORNER_LL_PROJECTION_X_PRODUCT")]
    pub ll_x: f64,
    #[serde(rename = "CORNER_LL_PROJECTION_Y_PRODUCT")]
    pub ll_y: f64,
    #[serde(rename = "CORNER_LR_PROJECTION_X_PRODUCT")]
    pub lr_x: f64,
    #[serde(rename = "CORNER_LR_PROJECTION_Y_PRODUCT")]
    pub lr_y: f64,
}

impl ProjectionAttributes {
    /// Envelope of the four scene corners
    pub fn footprint(&self) -> BoundingBox {
        let xs = [self.ul_x, self.ur_x, self.ll_x, self.lr_x];
        let ys = [self.ul_y, self.ur_y, self.ll_y, self.lr_y];
        BoundingBox::new(
            xs.iter().cloned().fold(f64::INFINITY, f64::min),
            ys.iter().cloned().fold(f64::INFINITY, f64::min),
            xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        )
    }
}

/// Scene identity resolved from the metadata document
#[derive(Debug, Clone, PartialEq)]
pub struct SceneMetadata {
    pub product: ProductId,
    pub product_id: String,
    pub sensor: Sensor,
    pub acquired: NaiveDate,
    pub cloud_cover: Option<f64>,
    pub footprint: BoundingBox,
}

/// Parser for Collection-2 scene metadata
pub struct MetadataParser;

impl MetadataParser {
    pub fn parse_mtl(xml_content: &str) -> BurnResult<SceneMetadata> {
        let doc = from_str::<MtlDocument>(xml_content)
            .map_err(|e| BurnError::XmlParsing(format!("Failed to parse MTL XML: {}", e)))?;

        let product_id = doc.product_contents.landsat_product_id.trim().to_string();
        let product = ProductId::parse(&product_id)?;

        let spacecraft = &doc.image_attributes.spacecraft_id;
        let sensor = Sensor::from_identifier(spacecraft).ok_or_else(|| {
            BurnError::Metadata(format!("unsupported spacecraft '{}'", spacecraft))
        })?;
        if sensor != product.sensor {
            return Err(BurnError::Metadata(format!(
                "spacecraft {} does not match product {}",
                spacecraft, product_id
            )));
        }

        let acquired = NaiveDate::parse_from_str(doc.image_attributes.date_acquired.trim(), "%Y-%m-%d")
            .map_err(|e| {
                BurnError::Metadata(format!(
                    "invalid DATE_ACQUIRED '{}': {}",
                    doc.image_attributes.date_acquired, e
                ))
            })?;
        if acquired != product.acquired {
            log::warn!(
                "{}: DATE_ACQUIRED {} differs from product id date {}",
                product_id,
                acquired,
                product.acquired
            );
        }

        let footprint = doc.projection_attributes.footprint();
        if !footprint.is_valid() {
            return Err(BurnError::Metadata(format!(
                "{}: degenerate scene corners",
                product_id
            )));
        }

        log::debug!("Parsed metadata for {} ({})", product_id, sensor);
        Ok(SceneMetadata {
            product,
            product_id,
            sensor,
            acquired,
            cloud_cover: doc.image_attributes.cloud_cover,
            footprint,
        })
    }

    pub fn read_mtl<P: AsRef<Path>>(path: P) -> BurnResult<SceneMetadata> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_mtl(&content)
    }
}
