use std::io::Write;

use somfilter::eval;
use somfilter::filter::expr::FilterExpr;
use somfilter::score::{self, ScorerOptions, VariantType};
use somfilter::stats::dist;
use somfilter::table::catalog::AnnotationCatalog;
use somfilter::table::goodmask::GoodMask;
use somfilter::train::{train, TrainerOptions};

fn synthetic_table(path: &std::path::Path, n: usize) {
    let mut f = std::fs::File::create(path).unwrap();
    writeln!(f, "#[1]CHROM\t[2]POS\t[3]MASK\t[4]REF\t[5]ALT\t[6]QUAL\t[7]DP").unwrap();
    for i in 0..n {
        // even i: GOOD, transition-biased; odd i: not GOOD, transversion-biased
        let (mask, refalt, qual, dp) = if i % 2 == 0 {
            ("1", ("A", "G"), 35.0 + (i % 10) as f64, 20.0 + (i % 5) as f64)
        } else {
            ("0", ("A", "C"), 5.0 + (i % 10) as f64, 3.0 + (i % 5) as f64)
        };
        writeln!(
            f,
            "chr1\t{}\t{mask}\t{}\t{}\t{qual}\t{dp}",
            1000 + i,
            refalt.0,
            refalt.1
        )
        .unwrap();
    }
}

#[test]
fn end_to_end_build_train_score_evaluate() {
    let dir = tempfile::tempdir().unwrap();
    let table_path = dir.path().join("annotations.tab");
    synthetic_table(&table_path, 2000);

    let good_mask = GoodMask::parse("1");
    let requested = vec!["QUAL".to_owned(), "DP".to_owned()];

    let sidecar_path = dir.path().join("run.n");
    let stats = dist::build_or_load(
        &table_path,
        &sidecar_path,
        good_mask,
        dist::DEFAULT_LO_PCTL,
        dist::DEFAULT_HI_PCTL,
        dir.path(),
        None,
    )
    .unwrap();
    assert_eq!(stats.len(), 2);

    let scalers = dist::scalers_for(&stats, &requested).unwrap();

    let header: Vec<String> = vec!["CHROM", "POS", "MASK", "REF", "ALT", "QUAL", "DP"]
        .into_iter()
        .map(String::from)
        .collect();
    let mut catalog = AnnotationCatalog::build(&header, &requested).unwrap();
    let learning_filter = FilterExpr::parse("", &mut catalog, &header, true, |_| None).unwrap();

    let train_options = TrainerOptions {
        n_total: 500,
        learn_fraction: 0.3,
        seed: 123,
        bins: 6,
        ensemble: 2,
        learn_rate0: 0.2,
        activation_threshold: 0.1,
    };
    let ensemble = train(
        &table_path,
        &requested,
        good_mask,
        scalers.clone(),
        &[0, 1],
        &learning_filter,
        train_options,
        None,
    )
    .unwrap();
    assert_eq!(ensemble.config().ensemble, 2);

    let sites_path = dir.path().join("run.sites.gz");
    let fixed_filter = FilterExpr::parse("", &mut catalog, &header, true, |_| None).unwrap();
    score::score(
        &table_path,
        &requested,
        good_mask,
        scalers,
        &ensemble,
        &sites_path,
        None,
        ScorerOptions {
            variant_type: VariantType::Snp,
            som_slots: &[0, 1],
            fixed_filter: &fixed_filter,
        },
        "score --table annotations.tab",
        None,
    )
    .unwrap();
    assert!(sites_path.exists());

    let tab_path = dir.path().join("run.tab");
    eval::evaluate(&sites_path, VariantType::Snp, &tab_path, "evaluate --prefix run").unwrap();

    let contents = std::fs::read_to_string(&tab_path).unwrap();
    let mut lines = contents.lines();
    assert!(lines.next().unwrap().starts_with("##somfilter_version"));
    assert!(lines.next().unwrap().starts_with("##command"));
    assert!(lines.next().unwrap().starts_with("#metric_all"));

    let mut last_sensitivity = 0.0;
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        let sensitivity: f64 = fields[2].parse().unwrap();
        assert!(sensitivity >= last_sensitivity - 1e-9);
        last_sensitivity = sensitivity;
    }
}
