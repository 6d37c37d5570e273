//! Integration tests for chunked, parallel and region-restricted decoding

use proptest::prelude::*;
use std::io::Write;
use varchunk::{read_vcf, Chunk, DataSource, DiagnosticKind, ReadOptions, VcfChunks};

const SAMPLE: &str = "tests/data/sample.vcf";

fn chunks(options: ReadOptions) -> Vec<Chunk> {
    VcfChunks::open(SAMPLE, options)
        .expect("Failed to open sample.vcf")
        .collect::<varchunk::Result<Vec<_>>>()
        .expect("Failed to decode sample.vcf")
}

fn positions(options: ReadOptions) -> Vec<i32> {
    let callset = read_vcf(SAMPLE, options.fields(["POS"])).unwrap();
    callset
        .column("variants/POS")
        .unwrap()
        .as_i32()
        .unwrap()
        .iter()
        .copied()
        .collect()
}

/// Synthetic VCF with `n` records spread over two chromosomes.
fn synthetic(n: usize) -> String {
    let mut text = String::from(
        "##fileformat=VCFv4.2\n\
         ##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">\n\
         ##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">\n\
         #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n",
    );
    for i in 0..n {
        let chrom = if i < n / 2 { "2L" } else { "2R" };
        let dp = if i % 7 == 0 { "x".to_string() } else { i.to_string() };
        text.push_str(&format!(
            "{}\t{}\t.\tA\tT\t{}\tPASS\tDP={}\tGT\t{}|{}\t./.\n",
            chrom,
            i + 1,
            i % 50,
            dp,
            i % 2,
            i % 3
        ));
    }
    text
}

fn synthetic_chunks(text: &str, options: ReadOptions) -> (Vec<Chunk>, Vec<varchunk::Diagnostic>) {
    let source = DataSource::from_reader(std::io::Cursor::new(text.as_bytes().to_vec()));
    let mut session = VcfChunks::open(source, options.fields(["*"])).unwrap();
    let chunks: Vec<Chunk> = session.by_ref().collect::<varchunk::Result<_>>().unwrap();
    (chunks, session.diagnostics().to_vec())
}

#[test]
fn test_chunk_lengths() {
    let all = chunks(ReadOptions::default().fields(["*"]).chunk_length(4));
    let lengths: Vec<_> = all.iter().map(Chunk::len).collect();
    assert_eq!(lengths, vec![4, 4, 1]);
    for chunk in &all {
        for column in chunk.columns().values() {
            assert_eq!(column.len(), chunk.len());
        }
    }
    assert_eq!(all[0].last_chrom.as_deref(), Some("20"));
    assert_eq!(all[0].last_pos, Some(17330));
    assert_eq!(all[2].last_chrom.as_deref(), Some("X"));
    assert_eq!(all[2].last_pos, Some(10));
}

#[test]
fn test_single_chunk_when_capacity_exceeds_input() {
    let all = chunks(ReadOptions::default());
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].len(), 9);
}

#[test]
fn test_parallel_blocks_match_direct() {
    let direct = chunks(ReadOptions::default().fields(["*"]).chunk_length(4));
    for workers in [2, 3, 8] {
        for block_length in [1, 2, 3, 5, 100] {
            let parallel = chunks(
                ReadOptions::default()
                    .fields(["*"])
                    .chunk_length(4)
                    .workers(workers)
                    .block_length(block_length),
            );
            assert_eq!(parallel.len(), direct.len());
            for (p, d) in parallel.iter().zip(&direct) {
                assert_eq!(p.len(), d.len());
                assert_eq!(p.last_pos, d.last_pos);
                // Debug output compares NaN fills as equal.
                assert_eq!(format!("{:?}", p.columns()), format!("{:?}", d.columns()));
            }
        }
    }
}

#[test]
fn test_parallel_diagnostics_in_order() {
    let text = synthetic(500);
    let (direct, direct_diagnostics) = synthetic_chunks(&text, ReadOptions::default().chunk_length(64));
    let (parallel, parallel_diagnostics) = synthetic_chunks(
        &text,
        ReadOptions::default().chunk_length(64).workers(4).block_length(10),
    );
    assert_eq!(parallel, direct);
    assert_eq!(parallel_diagnostics, direct_diagnostics);
    assert_eq!(
        direct_diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::ParseError)
            .count(),
        (0..500).filter(|i| i % 7 == 0).count()
    );
}

#[test]
fn test_regions_by_scan() {
    let cases: Vec<(&str, Vec<i32>)> = vec![
        ("19", vec![111, 112]),
        ("20", vec![14370, 17330, 1110696, 1230237, 1234567, 1235237]),
        ("X", vec![10]),
        ("Y", vec![]),
        ("20:1-100000", vec![14370, 17330]),
        ("20:1000000-1233000", vec![1110696, 1230237]),
        ("20:1233000-2000000", vec![1234567, 1235237]),
    ];
    for (region, expected) in cases {
        let options = ReadOptions::default().region(region).tabix(None);
        assert_eq!(positions(options), expected, "region {}", region);
    }
}

#[test]
fn test_region_falls_back_without_tabix() {
    let text = std::fs::read(SAMPLE).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&text).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.vcf.gz");
    std::fs::write(&path, encoder.finish().unwrap()).unwrap();

    let callset = read_vcf(
        DataSource::from_path(&path),
        ReadOptions::default()
            .fields(["POS"])
            .region("20:1000000-1233000")
            .tabix(Some("varchunk-missing-tabix")),
    )
    .unwrap();
    let pos: Vec<i32> = callset
        .column("variants/POS")
        .unwrap()
        .as_i32()
        .unwrap()
        .iter()
        .copied()
        .collect();
    assert_eq!(pos, vec![1110696, 1230237]);
    assert_eq!(callset.diagnostics.len(), 1);
    assert_eq!(callset.diagnostics[0].kind, DiagnosticKind::Environment);
}

#[test]
fn test_iteration_is_single_pass() {
    let mut session = VcfChunks::open(SAMPLE, ReadOptions::default()).unwrap();
    assert!(session.next().is_some());
    assert!(session.next().is_none());
    assert!(session.next().is_none());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_rows_are_preserved(
        n in 0usize..200,
        chunk_length in 1usize..50,
        workers in 1usize..4,
        block_length in 1usize..20,
    ) {
        let text = synthetic(n);
        let (chunks, _) = synthetic_chunks(
            &text,
            ReadOptions::default()
                .chunk_length(chunk_length)
                .workers(workers)
                .block_length(block_length),
        );
        let total: usize = chunks.iter().map(Chunk::len).sum();
        prop_assert_eq!(total, n);
        prop_assert!(chunks.iter().all(|c| c.len() <= chunk_length && !c.is_empty()));

        let positions: Vec<i32> = chunks
            .iter()
            .flat_map(|c| c.column("variants/POS").unwrap().as_i32().unwrap().iter().copied().collect::<Vec<_>>())
            .collect();
        let expected: Vec<i32> = (1..=n as i32).collect();
        prop_assert_eq!(positions, expected);
    }
}
