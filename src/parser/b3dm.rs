//! Batched 3D Model (b3dm) tile payloads: a feature table, a batch table and
//! an embedded binary glTF.

use anyhow::{Context, bail, ensure};
use bytemuck::{Pod, Zeroable};
use cgmath::Vector3;

use crate::parser::{
    ModelDocumentParser, ParseOptions, ParseOutcome, gltf::parse_gltf, url_extension,
};

pub const HEADER_LEN: usize = 28;

/// B3DM file header (28 bytes, little-endian)
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct B3dmHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub byte_length: u32,
    pub feature_table_json_byte_length: u32,
    pub feature_table_binary_byte_length: u32,
    pub batch_table_json_byte_length: u32,
    pub batch_table_binary_byte_length: u32,
}

/// The sections of a b3dm that matter for rendering.
#[derive(Debug)]
pub struct B3dmPayload<'a> {
    pub header: B3dmHeader,
    pub feature_table: serde_json::Value,
    pub feature_table_binary: &'a [u8],
    pub glb: &'a [u8],
}

impl B3dmPayload<'_> {
    /// `RTC_CENTER` from the feature table, either inline or as a float
    /// triple in the binary body.
    pub fn rtc_center(&self) -> Option<Vector3<f64>> {
        let value = self.feature_table.get("RTC_CENTER")?;
        if let Some([x, y, z]) = value.as_array().map(Vec::as_slice) {
            return Some(Vector3::new(x.as_f64()?, y.as_f64()?, z.as_f64()?));
        }
        let offset = value.get("byteOffset")?.as_u64()? as usize;
        let bytes = self.feature_table_binary.get(offset..offset.checked_add(12)?)?;
        let [x, y, z]: [f32; 3] = bytemuck::pod_read_unaligned(bytes);
        Some(Vector3::new(x as f64, y as f64, z as f64))
    }

    pub fn batch_length(&self) -> Option<u64> {
        self.feature_table.get("BATCH_LENGTH")?.as_u64()
    }
}

/// Splits a b3dm into its sections without copying.
pub fn decode_b3dm(data: &[u8]) -> anyhow::Result<B3dmPayload<'_>> {
    ensure!(data.len() >= HEADER_LEN, "File too small for b3dm header");
    let header: B3dmHeader = bytemuck::pod_read_unaligned(&data[..HEADER_LEN]);
    if &header.magic != b"b3dm" {
        bail!("Invalid magic: {:?}", header.magic);
    }
    if header.version != 1 {
        bail!("Unsupported b3dm version: {}", header.version);
    }
    let end = (header.byte_length as usize).min(data.len());
    if (header.byte_length as usize) > data.len() {
        log::warn!(
            "b3dm declares {} bytes but only {} are present",
            header.byte_length,
            data.len()
        );
    }

    let mut offset = HEADER_LEN;
    let feature_json = take(data, &mut offset, end, header.feature_table_json_byte_length, "feature table JSON")?;
    let feature_table_binary = take(data, &mut offset, end, header.feature_table_binary_byte_length, "feature table binary")?;
    take(data, &mut offset, end, header.batch_table_json_byte_length, "batch table JSON")?;
    take(data, &mut offset, end, header.batch_table_binary_byte_length, "batch table binary")?;

    let feature_table = parse_table(feature_json).context("Invalid feature table")?;
    let glb = &data[offset..end];

    Ok(B3dmPayload {
        header,
        feature_table,
        feature_table_binary,
        glb,
    })
}

fn take<'a>(data: &'a [u8], offset: &mut usize, end: usize, len: u32, what: &str) -> anyhow::Result<&'a [u8]> {
    let stop = *offset + len as usize;
    ensure!(stop <= end, "b3dm {} overruns the payload", what);
    let bytes = &data[*offset..stop];
    *offset = stop;
    Ok(bytes)
}

/// Tables are padded with spaces (or NULs in older writers).
fn parse_table(bytes: &[u8]) -> anyhow::Result<serde_json::Value> {
    let trimmed = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace() && *b != 0)
        .map_or(&bytes[..0], |last| &bytes[..=last]);
    if trimmed.is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    Ok(serde_json::from_slice(trimmed)?)
}

pub struct B3dmParser;

impl ModelDocumentParser for B3dmParser {
    fn name(&self) -> &'static str {
        "b3dm"
    }

    fn accepts(&self, bytes: &[u8], url: &str) -> bool {
        bytes.starts_with(b"b3dm") || (bytes.len() < 4 && url_extension(url).as_deref() == Some("b3dm"))
    }

    /// Feature-table `RTC_CENTER` is used unless the embedded glTF carries its own `CESIUM_RTC`.
    fn parse(&self, bytes: &[u8], options: &ParseOptions) -> ParseOutcome {
        let payload = match decode_b3dm(bytes) {
            Ok(payload) => payload,
            Err(e) => return ParseOutcome::failed(format!("{:#}", e)),
        };
        log::trace!(
            "b3dm: {} bytes, batch length {:?}, embedded glTF {} bytes",
            payload.header.byte_length,
            payload.batch_length(),
            payload.glb.len()
        );
        if payload.glb.is_empty() {
            return ParseOutcome::failed("b3dm has no embedded glTF");
        }
        let mut warnings = Vec::new();
        match parse_gltf(payload.glb, options, &mut warnings) {
            Ok(mut document) => {
                if document.rtc_center.is_none() {
                    document.rtc_center = payload.rtc_center();
                }
                ParseOutcome {
                    document: Some(document),
                    errors: Vec::new(),
                    warnings,
                }
            }
            Err(e) => ParseOutcome {
                document: None,
                errors: vec![format!("Embedded glTF: {:#}", e)],
                warnings,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b3dm(feature_json: &[u8], feature_bin: &[u8], glb: &[u8]) -> Vec<u8> {
        let total = HEADER_LEN + feature_json.len() + feature_bin.len() + glb.len();
        let header = B3dmHeader {
            magic: *b"b3dm",
            version: 1,
            byte_length: total as u32,
            feature_table_json_byte_length: feature_json.len() as u32,
            feature_table_binary_byte_length: feature_bin.len() as u32,
            batch_table_json_byte_length: 0,
            batch_table_binary_byte_length: 0,
        };
        let mut out = bytemuck::bytes_of(&header).to_vec();
        out.extend_from_slice(feature_json);
        out.extend_from_slice(feature_bin);
        out.extend_from_slice(glb);
        out
    }

    #[test]
    fn inline_rtc_center() {
        let data = b3dm(br#"{"BATCH_LENGTH":0,"RTC_CENTER":[1,2,3]}  "#, &[], b"glTF");
        let payload = decode_b3dm(&data).unwrap();
        assert_eq!(payload.rtc_center(), Some(Vector3::new(1.0, 2.0, 3.0)));
        assert_eq!(payload.batch_length(), Some(0));
        assert_eq!(payload.glb, b"glTF");
    }

    #[test]
    fn binary_rtc_center() {
        let bin: Vec<u8> = bytemuck::cast_slice(&[4.0f32, 5.0, 6.0]).to_vec();
        let data = b3dm(br#"{"RTC_CENTER":{"byteOffset":0}}"#, &bin, b"");
        let payload = decode_b3dm(&data).unwrap();
        assert_eq!(payload.rtc_center(), Some(Vector3::new(4.0, 5.0, 6.0)));
    }

    #[test]
    fn rtc_offset_past_the_binary_body_is_ignored() {
        let bin: Vec<u8> = bytemuck::cast_slice(&[4.0f32, 5.0, 6.0]).to_vec();
        for offset in [4, u64::MAX] {
            let json = format!(r#"{{"RTC_CENTER":{{"byteOffset":{}}}}}"#, offset);
            let data = b3dm(json.as_bytes(), &bin, b"");
            assert_eq!(decode_b3dm(&data).unwrap().rtc_center(), None);
        }
    }

    #[test]
    fn truncated_sections_are_rejected() {
        let mut data = b3dm(b"{}", &[], b"");
        data[12..16].copy_from_slice(&100u32.to_le_bytes());
        assert!(decode_b3dm(&data).is_err());
        assert!(decode_b3dm(b"b3dm").is_err());
    }

    #[test]
    fn empty_glb_is_a_parse_error() {
        let data = b3dm(b"{}", &[], b"");
        let outcome = B3dmParser.parse(&data, &ParseOptions::default());
        assert!(outcome.document.is_none());
        assert!(outcome.has_errors());
    }
}
