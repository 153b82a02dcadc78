//! End-to-end runs of the GISAID chain over files on disk.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use ncov_ingest::normalize::StrainNamer;
use ncov_ingest::sink::WriteMetadata;
use ncov_ingest::transforms::{CanonicalizeStrainName, MaskCollectionDate};
use ncov_ingest::{
    Annotations, DataSource, GeoRules, GisaidOutputs, NdjsonSource, PipelineError, Stage,
    TabularSource, TransformConfig, chain_all, drain, gisaid_stages,
};

const RECORD_CA: &str = r#"{"covv_virus_name": "hCoV-19/USA/CA-CZB-1/2020", "covv_accession_id": "EPI_ISL_1", "covv_collection_date": "2020-03-01", "covv_subm_date": "2020-03-20", "covv_location": "North America / USA / California / San Francisco", "covv_host": "Human", "covv_orig_lab": "Lab  A", "covv_authors": "Doe, J., Roe, R.", "covv_patient_age": "45", "covv_gender": "male", "sequence": "ACGT\nACGT"}"#;

const RECORD_IS: &str = r#"{"covv_virus_name": "hCoV-19/Iceland/42/2020", "covv_accession_id": "EPI_ISL_2", "covv_collection_date": "2020-04-02", "covv_subm_date": "2020-04-01", "covv_location": "Europe/Iceland", "covv_orig_lab": "", "covv_authors": "Smith and Jones", "covv_patient_age": "unknown", "covv_gender": "Female", "sequence": "ACGTACGTAC"}"#;

const RECORD_SHORT: &str = r#"{"covv_virus_name": "hCoV-19/X/1/2020", "covv_accession_id": "EPI_ISL_3", "covv_location": "Asia", "sequence": "AC"}"#;

const RECORD_NO_SEQUENCE: &str = r#"{"covv_virus_name": "hCoV-19/USA/B/2020", "covv_accession_id": "EPI_ISL_4", "covv_location": "North America / USA"}"#;

const COLUMNS: &[&str] = &[
    "strain",
    "gisaid_epi_isl",
    "date",
    "region",
    "country",
    "division",
    "location",
    "division_exposure",
    "length",
    "age",
    "sex",
    "authors",
    "originating_lab",
];

fn test_config() -> TransformConfig {
    TransformConfig {
        metadata_columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
        min_length: Some(5),
        ..TransformConfig::default()
    }
}

fn write(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_gisaid_chain_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(
        dir.path(),
        "gisaid.ndjson",
        &format!("{RECORD_CA}\n\n{RECORD_IS}\n{RECORD_SHORT}\n"),
    );
    let annotations_path = write(
        dir.path(),
        "annotations.tsv",
        "EPI_ISL_2\tdivision_exposure\tCapital Region # travel history\n\
         EPI_ISL_999\thost\tCat\n",
    );
    let rules_path = write(
        dir.path(),
        "geo_rules.tsv",
        "# curated locations\n\
         North America/USA/California/San Francisco\tNorth America/USA/California/San Francisco County\n\
         Europe/Atlantis/*/*\tEurope/*/*/*\n",
    );

    let annotations = Rc::new(Annotations::load(&annotations_path).unwrap());
    let rules = Rc::new(GeoRules::load(&rules_path).unwrap());
    let outputs = GisaidOutputs {
        metadata: dir.path().join("metadata.tsv"),
        fasta: Some(dir.path().join("sequences.fasta")),
        hierarchy: Some(dir.path().join("hierarchy.tsv")),
    };

    let stages = gisaid_stages(
        &test_config(),
        Rc::clone(&annotations),
        Rc::clone(&rules),
        &outputs,
    )
    .unwrap();
    let mut chain = chain_all(NdjsonSource::from_path(&input), stages);
    assert_eq!(drain(&mut chain).unwrap(), 2);
    drop(chain);

    let metadata = fs::read_to_string(&outputs.metadata).unwrap();
    let lines: Vec<&str> = metadata.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], COLUMNS.join("\t"));
    assert_eq!(
        lines[1],
        "USA/CA-CZB-1/2020\tEPI_ISL_1\t2020-03-01\tNorth America\tUSA\tCalifornia\t\
         San Francisco County\tCalifornia\t8\t45\tMale\tDoe et al\tLab A"
    );
    assert_eq!(
        lines[2],
        "Iceland/42/2020\tEPI_ISL_2\tXXXX-XX-XX\tEurope\tIceland\tIceland\t\t\
         Capital Region\t10\t?\tFemale\tSmith et al\t"
    );

    assert_eq!(
        fs::read_to_string(outputs.fasta.as_ref().unwrap()).unwrap(),
        ">USA/CA-CZB-1/2020\nACGTACGT\n>Iceland/42/2020\nACGTACGTAC\n"
    );

    assert_eq!(
        fs::read_to_string(outputs.hierarchy.as_ref().unwrap()).unwrap(),
        "region\tcountry\tdivision\n\
         Europe\tIceland\tCapital Region\n\
         Europe\tIceland\tIceland\n\
         North America\tUSA\tCalifornia\n"
    );

    assert_eq!(annotations.unused_annotations(), vec!["EPI_ISL_999".to_string()]);
    let unused_rules = rules.unused_rules();
    assert_eq!(unused_rules.len(), 1);
    assert_eq!(unused_rules[0][1], "Atlantis");
}

#[test]
fn test_record_without_sequence_is_filtered_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(
        dir.path(),
        "gisaid.ndjson",
        &format!("{RECORD_CA}\n{RECORD_NO_SEQUENCE}\n"),
    );
    let outputs = GisaidOutputs {
        metadata: dir.path().join("metadata.tsv"),
        fasta: Some(dir.path().join("sequences.fasta")),
        hierarchy: None,
    };
    let stages = gisaid_stages(
        &test_config(),
        Rc::new(Annotations::new()),
        Rc::new(GeoRules::new()),
        &outputs,
    )
    .unwrap();

    let mut chain = chain_all(NdjsonSource::from_path(&input), stages);
    assert_eq!(drain(&mut chain).unwrap(), 1);
    drop(chain);

    let metadata = fs::read_to_string(&outputs.metadata).unwrap();
    assert_eq!(metadata.lines().count(), 2);
    assert!(metadata.contains("EPI_ISL_1"));
    assert!(!metadata.contains("EPI_ISL_4"));
}

#[test]
fn test_malformed_line_aborts_with_context() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(
        dir.path(),
        "gisaid.ndjson",
        &format!("{RECORD_CA}\n{{\"covv_virus_name\": \n{RECORD_IS}\n"),
    );
    let outputs = GisaidOutputs {
        metadata: dir.path().join("metadata.tsv"),
        fasta: None,
        hierarchy: None,
    };
    let stages = gisaid_stages(
        &test_config(),
        Rc::new(Annotations::new()),
        Rc::new(GeoRules::new()),
        &outputs,
    )
    .unwrap();

    let result = {
        let mut chain = chain_all(NdjsonSource::from_path(&input), stages);
        drain(&mut chain)
    };
    match result {
        Err(PipelineError::Parse {
            line_number, line, ..
        }) => {
            assert_eq!(line_number, 2);
            assert_eq!(line, "{\"covv_virus_name\": ");
        }
        other => panic!("expected a parse error, got {other:?}"),
    }

    // rows written before the failure are kept
    let metadata = fs::read_to_string(&outputs.metadata).unwrap();
    assert_eq!(metadata.lines().count(), 2);
    assert!(metadata.contains("EPI_ISL_1"));
}

#[test]
fn test_rule_cycle_aborts_whole_pass() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "gisaid.ndjson", &format!("{RECORD_CA}\n"));
    let mut rules = GeoRules::new();
    rules.add_rule(
        ["North America", "*", "*", "*"].map(String::from),
        ["Americas", "*", "*", "*"].map(String::from),
    );
    rules.add_rule(
        ["Americas", "*", "*", "*"].map(String::from),
        ["North America", "*", "*", "*"].map(String::from),
    );
    let outputs = GisaidOutputs {
        metadata: dir.path().join("metadata.tsv"),
        fasta: None,
        hierarchy: None,
    };
    let stages = gisaid_stages(
        &test_config(),
        Rc::new(Annotations::new()),
        Rc::new(rules),
        &outputs,
    )
    .unwrap();
    let mut chain = chain_all(NdjsonSource::from_path(&input), stages);
    match drain(&mut chain) {
        Err(PipelineError::RuleCycle { start, .. }) => assert_eq!(start[0], "North America"),
        other => panic!("expected a rule cycle, got {other:?}"),
    }
}

#[test]
fn test_tabular_genbank_chain() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(
        dir.path(),
        "genbank.tsv",
        "strain\tgenbank_accession\tdate\tdate_submitted\n\
         SARS-CoV-2/human/USA/WA-UW-1572/2020\tMT293201\t2020-03-10\t2020-04-01\n\
         Severe acute respiratory syndrome\tMT293202\t2020-05-01\t2020-04-01\n",
    );
    let output = dir.path().join("metadata.csv");

    let config = TransformConfig::default();
    let namer = StrainNamer::new(
        &config.strain_prefixes,
        &config.strain_pattern,
        &config.strain_exception,
    )
    .unwrap();
    let mut chain = TabularSource::tsv(&input)
        .pipe(Stage::transform(CanonicalizeStrainName::new(
            namer,
            "genbank_accession",
        )))
        .pipe(Stage::transform(MaskCollectionDate::default()))
        .pipe(Stage::transform(
            WriteMetadata::create(
                &output,
                vec!["strain".into(), "genbank_accession".into(), "date".into()],
                b',',
                "?",
            )
            .unwrap(),
        ));
    assert_eq!(drain(&mut chain).unwrap(), 2);
    drop(chain);

    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "strain,genbank_accession,date\n\
         USA/WA-UW-1572/2020,MT293201,2020-03-10\n\
         MT293202,MT293202,XXXX-XX-XX\n"
    );
}
