//! Turns a vision response into a flower count report.
//!
//! Pure and infallible: the same [`VisionResult`] always yields the same
//! [`FlowerAnalysis`], possibly with no flowers.

use std::collections::HashMap;

use serde::Serialize;

use crate::vision::VisionResult;

/// Tag names containing any of these count as flowers.
pub const FLOWER_VOCABULARY: [&str; 10] = [
    "flower",
    "rose",
    "tulip",
    "daisy",
    "lily",
    "orchid",
    "sunflower",
    "iris",
    "peony",
    "bouquet",
];

/// Detected object names containing any of these count as flowers.
pub const OBJECT_VOCABULARY: [&str; 2] = ["flower", "bouquet"];

/// One flower-like classification.
#[derive(Debug, Clone, PartialEq)]
pub struct TagHit {
    pub kind: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowerCount {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: usize,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlowerAnalysis {
    pub flowers: Vec<FlowerCount>,
    pub colors: Vec<String>,
    pub description: String,
}

impl FlowerAnalysis {
    pub fn has_flowers(&self) -> bool {
        !self.flowers.is_empty()
    }
}

fn matches_any(name: &str, vocabulary: &[&str]) -> bool {
    let name = name.to_lowercase();
    vocabulary.iter().any(|word| name.contains(word))
}

/// Flower-like hits from both the tag list and the object list, tags first.
pub fn flower_hits(result: &VisionResult) -> Vec<TagHit> {
    let tags = result
        .tags()
        .iter()
        .filter(|t| matches_any(&t.name, &FLOWER_VOCABULARY))
        .map(|t| TagHit {
            kind: t.name.clone(),
            confidence: t.confidence,
        });
    let objects = result
        .objects()
        .iter()
        .filter(|o| matches_any(&o.object, &OBJECT_VOCABULARY))
        .map(|o| TagHit {
            kind: o.object.clone(),
            confidence: o.confidence,
        });
    tags.chain(objects).collect()
}

/// Group hits case-insensitively. Count is the group size, confidence the
/// highest seen. Groups keep first-seen order.
pub fn merge_hits(hits: impl IntoIterator<Item = TagHit>) -> Vec<FlowerCount> {
    let mut flowers: Vec<FlowerCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for hit in hits {
        let key = hit.kind.to_lowercase();
        match index.get(&key) {
            Some(&i) => {
                let entry = &mut flowers[i];
                entry.count += 1;
                entry.confidence = entry.confidence.max(hit.confidence);
            }
            None => {
                index.insert(key.clone(), flowers.len());
                flowers.push(FlowerCount {
                    kind: key,
                    count: 1,
                    confidence: hit.confidence,
                });
            }
        }
    }

    flowers
}

pub fn aggregate(result: &VisionResult) -> FlowerAnalysis {
    FlowerAnalysis {
        flowers: merge_hits(flower_hits(result)),
        colors: result.dominant_colors().to_vec(),
        description: result.first_caption().unwrap_or_default().to_string(),
    }
}
