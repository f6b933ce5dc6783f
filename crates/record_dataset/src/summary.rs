//! Per-class counts for a label mapping.

use crate::labels::LabelMapping;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub name: String,
    pub code: i64,
    pub images: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// One entry per class, in label order.
    pub classes: Vec<ClassSummary>,
    pub total: usize,
}

impl DatasetSummary {
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Classes with no images (possible when a class directory only holds non-image files).
    pub fn empty_classes(&self) -> impl Iterator<Item = &ClassSummary> {
        self.classes.iter().filter(|c| c.images == 0)
    }
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} images in {} classes", self.total, self.classes.len())?;
        for class in &self.classes {
            writeln!(f, "  [{}] {}: {}", class.code, class.name, class.images)?;
        }
        Ok(())
    }
}

pub fn summarize_mapping(mapping: &LabelMapping) -> DatasetSummary {
    let mut counts = vec![0usize; mapping.num_classes()];
    for sample in &mapping.samples {
        if let Some(slot) = usize::try_from(sample.label)
            .ok()
            .and_then(|idx| counts.get_mut(idx))
        {
            *slot += 1;
        }
    }
    let classes = mapping
        .classes
        .iter()
        .zip(counts)
        .enumerate()
        .map(|(code, (name, images))| ClassSummary {
            name: name.clone(),
            code: code as i64,
            images,
        })
        .collect();
    DatasetSummary {
        classes,
        total: mapping.samples.len(),
    }
}
