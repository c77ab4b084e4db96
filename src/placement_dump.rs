use crate::placement::{BoxRecord, CircleRecord, FeaturePlacement, FlipState, PlacementCounts, PlacementResult};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementDump {
    pub counts: PlacementCounts,
    pub buckets: Vec<BucketDump>,
    pub boxes: Vec<BoxRecord>,
    pub circles: Vec<CircleRecord>,
    pub queries: Vec<BTreeMap<u32, Vec<u32>>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketDump {
    pub bucket_instance_id: u32,
    pub line_labels_placed: usize,
    pub line_labels_hidden: usize,
    pub line_labels_flipped: usize,
    pub flip_states: Vec<FlipState>,
    /// One entry per glyph quad; hidden glyphs are `null`.
    pub glyphs: Vec<Option<GlyphDump>>,
    pub features: Vec<FeaturePlacement>,
}

#[derive(Debug, Serialize)]
pub struct GlyphDump {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub angle: f32,
}

impl PlacementDump {
    pub fn from_result(result: &PlacementResult) -> Self {
        let buckets = result
            .buckets
            .iter()
            .map(|bucket| {
                // Four identical vertices per glyph.
                let glyphs = bucket
                    .dynamic_vertices
                    .as_slice()
                    .chunks(4)
                    .map(|quad| {
                        let v = quad[0];
                        v.x.is_finite().then_some(GlyphDump {
                            x: v.x,
                            y: v.y,
                            z: v.z,
                            angle: v.angle,
                        })
                    })
                    .collect();
                BucketDump {
                    bucket_instance_id: bucket.bucket_instance_id,
                    line_labels_placed: bucket.line_labels.placed,
                    line_labels_hidden: bucket.line_labels.hidden,
                    line_labels_flipped: bucket.line_labels.flipped,
                    flip_states: bucket.flip_states.clone(),
                    glyphs,
                    features: bucket.features.clone(),
                }
            })
            .collect();

        PlacementDump {
            counts: result.counts,
            buckets,
            boxes: result.boxes.clone(),
            circles: result.circles.clone(),
            queries: result.query_results.clone(),
        }
    }
}

pub fn write_placement_dump(writer: impl Write, result: &PlacementResult, pretty: bool) -> anyhow::Result<()> {
    let dump = PlacementDump::from_result(result);
    if pretty {
        serde_json::to_writer_pretty(writer, &dump)?;
    } else {
        serde_json::to_writer(writer, &dump)?;
    }
    Ok(())
}

pub fn write_placement_dump_file(path: &Path, result: &PlacementResult, pretty: bool) -> anyhow::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_placement_dump(&mut writer, result, pretty)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::{BucketPlacement, DynamicVertexArray, LineLabelStats};
    use glam::DVec3;

    #[test]
    fn hidden_glyphs_dump_as_null() {
        let mut vertices = DynamicVertexArray::new();
        vertices.add_glyph(DVec3::new(10.0, 20.0, 0.0), 0.5);
        vertices.hide_glyphs(1);
        let result = PlacementResult {
            buckets: vec![BucketPlacement {
                bucket_instance_id: 4,
                dynamic_vertices: vertices,
                flip_states: vec![FlipState::FlipNotRequired],
                line_labels: LineLabelStats::default(),
                features: Vec::new(),
            }],
            ..PlacementResult::default()
        };

        let mut out = Vec::new();
        write_placement_dump(&mut out, &result, false).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let glyphs = &json["buckets"][0]["glyphs"];
        assert_eq!(glyphs[0]["x"], 10.0);
        assert!(glyphs[1].is_null());
        assert_eq!(json["buckets"][0]["flipStates"][0], "flipNotRequired");
        assert_eq!(json["buckets"][0]["bucketInstanceId"], 4);
    }
}
