//! Draw commands and the frame wire format.
//!
//! A published frame is `[frame_number, timestamp_ms, entity]`, MessagePack encoded with the
//! compact array representation, so struct fields below are wire fields in declaration order.
//! A draw entity is a `[tag, payload]` envelope: tag 0 wraps a nested collection as
//! `[count, [entity, …]]`, tag 1 a list of arc records, tag 2 a list of line records. The
//! envelope is recursive so a single mixer layer can carry a whole saved layer stack.
//!
//! All angular fields (`start`, `stop`, `rot_angle`) are phases in `[0, 1)`. Positions and radii
//! are fractions of the client's screen, offsets measured from its center, so clients of any
//! resolution rasterize the same scene.

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

// -------------------------------------------------------------------------------------------------

/// One drawn ring segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArcRecord {
    /// Draw intensity, 0–255.
    pub level: u32,
    /// Stroke thickness as a screen fraction.
    pub thickness: f32,
    pub hue: f32,
    pub sat: f32,
    /// Color value, 0–255.
    pub val: u32,
    /// Center offset from screen center, `-0.5..0.5`.
    pub x: f32,
    pub y: f32,
    /// Horizontal radius as a screen fraction.
    pub rad_x: f32,
    /// Vertical radius as a screen fraction.
    pub rad_y: f32,
    /// Arc start phase.
    pub start: f32,
    /// Arc stop phase.
    pub stop: f32,
    /// Rotation of the whole arc, as a phase.
    pub rot_angle: f32,
}

// -------------------------------------------------------------------------------------------------

/// One drawn straight beam.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineRecord {
    /// Draw intensity, 0–255.
    pub level: u32,
    pub thickness: f32,
    pub hue: f32,
    pub sat: f32,
    pub val: u32,
    pub x: f32,
    pub y: f32,
    /// Beam length as a screen fraction.
    pub length: f32,
    pub start: f32,
    pub stop: f32,
    pub rot_angle: f32,
}

// -------------------------------------------------------------------------------------------------

/// A recursively composed draw command tree, the payload of one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawEntity {
    /// Ordered collection of nested entities. Wire tag 0.
    Group(Vec<DrawEntity>),
    /// List of arc draw commands. Wire tag 1.
    Arcs(Vec<ArcRecord>),
    /// List of line draw commands. Wire tag 2.
    Lines(Vec<LineRecord>),
}

impl DrawEntity {
    /// An empty collection, the payload of a frame with nothing to draw.
    pub fn empty() -> Self {
        Self::Group(Vec::new())
    }

    /// Total number of leaf draw commands in this tree.
    pub fn command_count(&self) -> usize {
        match self {
            Self::Group(entities) => entities.iter().map(Self::command_count).sum(),
            Self::Arcs(arcs) => arcs.len(),
            Self::Lines(lines) => lines.len(),
        }
    }
}

impl Serialize for DrawEntity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut envelope = serializer.serialize_tuple(2)?;
        match self {
            Self::Group(entities) => {
                envelope.serialize_element(&0u32)?;
                envelope.serialize_element(&GroupPayload(entities.len() as u32, entities))?;
            }
            Self::Arcs(arcs) => {
                envelope.serialize_element(&1u32)?;
                envelope.serialize_element(arcs)?;
            }
            Self::Lines(lines) => {
                envelope.serialize_element(&2u32)?;
                envelope.serialize_element(lines)?;
            }
        }
        envelope.end()
    }
}

/// Tag 0 payload: explicit count followed by the nested entities.
#[derive(Serialize)]
struct GroupPayload<'a>(u32, &'a [DrawEntity]);

impl<'de> Deserialize<'de> for DrawEntity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntityVisitor;

        impl<'de> Visitor<'de> for EntityVisitor {
            type Value = DrawEntity;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a [tag, payload] draw entity envelope")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let tag: u32 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                match tag {
                    0 => {
                        let (count, entities): (u32, Vec<DrawEntity>) = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                        if count as usize != entities.len() {
                            return Err(de::Error::custom(format!(
                                "collection count {count} does not match {} entities",
                                entities.len()
                            )));
                        }
                        Ok(DrawEntity::Group(entities))
                    }
                    1 => {
                        let arcs = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                        Ok(DrawEntity::Arcs(arcs))
                    }
                    2 => {
                        let lines = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                        Ok(DrawEntity::Lines(lines))
                    }
                    other => Err(de::Error::custom(format!("unknown draw entity tag {other}"))),
                }
            }
        }

        deserializer.deserialize_tuple(2, EntityVisitor)
    }
}

// -------------------------------------------------------------------------------------------------

/// One frame of draw output for a single video channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Monotonic per channel; wraps without effect on receivers.
    pub frame_number: u32,
    /// Milliseconds since an arbitrary per-show epoch; clients use deltas only.
    pub timestamp_ms: i64,
    pub entity: DrawEntity,
}

impl Frame {
    /// Encode for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        rmp_serde::to_vec(self).map_err(|err| Error::EncodeError(err.to_string()))
    }

    /// Decode a wire payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        rmp_serde::from_slice(bytes).map_err(|err| Error::DecodeError(err.to_string()))
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn arc(seed: f32) -> ArcRecord {
        ArcRecord {
            level: 255,
            thickness: 0.01 * seed,
            hue: 0.1 * seed,
            sat: 1.0,
            val: 255,
            x: 0.0,
            y: -0.25,
            rad_x: 0.3,
            rad_y: 0.3,
            start: 0.125 * seed,
            stop: 0.25 * seed,
            rot_angle: 0.5,
        }
    }

    fn line(seed: f32) -> LineRecord {
        LineRecord {
            level: 128,
            thickness: 0.02,
            hue: 0.6,
            sat: 0.5,
            val: 255,
            x: 0.1 * seed,
            y: 0.0,
            length: 0.8,
            start: 0.0,
            stop: 1.0,
            rot_angle: 0.25 * seed,
        }
    }

    #[test]
    fn round_trip_arcs() {
        let frame = Frame {
            frame_number: 42,
            timestamp_ms: 123_456,
            entity: DrawEntity::Arcs(vec![arc(1.0), arc(2.0), arc(3.0)]),
        };
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn round_trip_nested_collections() {
        let frame = Frame {
            frame_number: u32::MAX, // wraps next frame, receivers don't care
            timestamp_ms: -1,
            entity: DrawEntity::Group(vec![
                DrawEntity::Arcs(vec![arc(1.0)]),
                DrawEntity::Group(vec![
                    DrawEntity::Lines(vec![line(1.0), line(2.0)]),
                    DrawEntity::Arcs(vec![]),
                ]),
            ]),
        };
        let decoded = Frame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn empty_frame_wire_shape() {
        let frame = Frame {
            frame_number: 0,
            timestamp_ms: 0,
            entity: DrawEntity::empty(),
        };
        let bytes = frame.encode().unwrap();
        // check the raw shape through a generic value: [0, 0, [0, [0, []]]]
        let value: serde_json::Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(value[0], 0);
        assert_eq!(value[2][0], 0);
        assert_eq!(value[2][1][0], 0);
        assert_eq!(value[2][1][1].as_array().unwrap().len(), 0);
    }

    #[test]
    fn arc_list_wire_shape() {
        let frame = Frame {
            frame_number: 7,
            timestamp_ms: 1000,
            entity: DrawEntity::Arcs(vec![arc(1.0)]),
        };
        let value: serde_json::Value = rmp_serde::from_slice(&frame.encode().unwrap()).unwrap();
        assert_eq!(value[2][0], 1);
        let record = value[2][1][0].as_array().unwrap();
        assert_eq!(record.len(), 12);
        assert_eq!(record[0], 255); // level leads the record
        assert_eq!(record[4], 255); // val
    }

    #[test]
    fn count_mismatch_is_rejected() {
        // hand-build a tag-0 envelope whose count disagrees with its entity list
        let broken = (1u32, -2i64, (0u32, (999u32, Vec::<DrawEntity>::new())));
        let bytes = rmp_serde::to_vec(&broken).unwrap();
        assert!(matches!(Frame::decode(&bytes), Err(Error::DecodeError(_))));
    }

    #[test]
    fn command_counts() {
        let entity = DrawEntity::Group(vec![
            DrawEntity::Arcs(vec![arc(1.0), arc(2.0)]),
            DrawEntity::Group(vec![DrawEntity::Lines(vec![line(1.0)])]),
        ]);
        assert_eq!(entity.command_count(), 3);
        assert_eq!(DrawEntity::empty().command_count(), 0);
    }
}
