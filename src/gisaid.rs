//! The standard GISAID transform chain.
//!
//! ```text
//! ndjson | rename | standardize | [min length] | fasta | drop sequence
//!        | expand location | fix labs | authors | age | sex | hardcoded
//!        | mask date | geo rules | annotations | default location
//!        | [hierarchy] | metadata
//! ```

use std::path::PathBuf;
use std::rc::Rc;

use crate::annotations::Annotations;
use crate::config::TransformConfig;
use crate::error::Result;
use crate::filters::SequenceLengthFilter;
use crate::geo_rules::GeoRules;
use crate::pipeline::Stage;
use crate::sink::{CollectLocationHierarchy, WriteFasta, WriteMetadata};
use crate::transforms::{
    AbbreviateAuthors, AddHardcodedMetadata, ApplyUserGeoLocationSubstitutionRules,
    DropSequenceData, ExpandLocation, FillDefaultLocationData, FixLabs, MaskCollectionDate,
    MergeUserAnnotatedMetadata, ParsePatientAge, ParseSex, RenameAndAddColumns, StandardizeData,
};

/// Identifier field annotations are keyed on.
pub const ANNOTATION_ID_FIELD: &str = "gisaid_epi_isl";

/// Where the chain writes.
#[derive(Debug, Clone)]
pub struct GisaidOutputs {
    pub metadata: PathBuf,
    pub fasta: Option<PathBuf>,
    pub hierarchy: Option<PathBuf>,
}

/// Build the stages in order. Output files are created here.
pub fn gisaid_stages(
    config: &TransformConfig,
    annotations: Rc<Annotations>,
    rules: Rc<GeoRules>,
    outputs: &GisaidOutputs,
) -> Result<Vec<Stage>> {
    let mut stages = vec![
        Stage::transform(RenameAndAddColumns::new(config.column_map.clone())),
        Stage::transform(StandardizeData::new(
            config.date_columns.clone(),
            config.date_formats.clone(),
        )),
    ];

    if let Some(min_length) = config.min_length {
        stages.push(Stage::filter(SequenceLengthFilter::new(min_length)));
    }
    if let Some(path) = &outputs.fasta {
        stages.push(Stage::transform(WriteFasta::create(path)?));
    }

    stages.extend([
        Stage::transform(DropSequenceData),
        Stage::transform(ExpandLocation::new(
            config.articles.clone(),
            config.abbreviations.clone(),
        )),
        Stage::transform(FixLabs),
        Stage::transform(AbbreviateAuthors),
        Stage::transform(ParsePatientAge),
        Stage::transform(ParseSex),
        Stage::transform(AddHardcodedMetadata::new(config.hardcoded_metadata.clone())),
        Stage::transform(MaskCollectionDate::default()),
        Stage::transform(ApplyUserGeoLocationSubstitutionRules::new(rules)),
        Stage::transform(MergeUserAnnotatedMetadata::new(
            annotations,
            ANNOTATION_ID_FIELD,
        )),
        Stage::transform(FillDefaultLocationData),
    ]);

    if let Some(path) = &outputs.hierarchy {
        stages.push(Stage::transform(CollectLocationHierarchy::new(path)));
    }
    stages.push(Stage::transform(WriteMetadata::create(
        &outputs.metadata,
        config.metadata_columns.clone(),
        config.delimiter_byte(),
        config.placeholder.clone(),
    )?));

    Ok(stages)
}
