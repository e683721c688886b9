use std::path::Path;

use log::{info, warn};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::errors::Result;
use crate::filter::expr::FilterExpr;
use crate::som::engine::{SomConfig, SomEnsemble};
use crate::stats::scale::Scaler;
use crate::table::goodmask::GoodMask;
use crate::table::reader::TableReader;

/// Classical reservoir sampling (Algorithm R).
struct Reservoir {
    capacity: usize,
    items: Vec<Vec<f64>>,
    count_seen: u64,
}

impl Reservoir {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity),
            count_seen: 0,
        }
    }

    fn offer(&mut self, v: Vec<f64>, rng: &mut SmallRng) {
        self.count_seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(v);
        } else if self.capacity > 0 {
            let j = rng.gen_range(0..self.count_seen);
            if (j as usize) < self.capacity {
                self.items[j as usize] = v;
            }
        }
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

pub struct TrainerOptions {
    pub n_total: u64,
    pub learn_fraction: f64,
    pub seed: u64,
    pub bins: usize,
    pub ensemble: usize,
    pub learn_rate0: f64,
    pub activation_threshold: f64,
}

/// Reservoir-sample GOOD and LEARN training vectors from the table, then
/// train and freeze a `SomEnsemble`. `som_slots` names, in order, which of
/// the catalog's selected slots make up the SOM's input dimensions
/// (annotations added implicitly by a filter expression are excluded).
pub fn train(
    table_path: &Path,
    requested: &[String],
    good_mask: GoodMask,
    scalers: Vec<Scaler>,
    som_slots: &[usize],
    learning_filter: &FilterExpr,
    options: TrainerOptions,
    region: Option<&crate::config::Region>,
) -> Result<SomEnsemble> {
    let mut reader = TableReader::open_selected(table_path, requested, good_mask, scalers)?;
    let n_selected = reader.n_selected();

    // Floor the learn capacity and derive the good capacity as the
    // remainder so the two reservoirs never sum to more than `n_total`
    // (rounding both independently can overshoot by one, which would push a
    // single map's training counter past `N`).
    let learn_capacity = (options.n_total as f64 * options.learn_fraction).floor() as usize;
    let good_capacity = options.n_total as usize - learn_capacity;
    let mut good_reservoir = Reservoir::new(good_capacity);
    let mut learn_reservoir = Reservoir::new(learn_capacity);
    let mut rng = SmallRng::seed_from_u64(options.seed);

    let spinner = crate::util::get_spinner();
    spinner.set_message("reservoir-sampling training vectors");
    while let Some(record) = reader.next()? {
        if let Some(region) = region {
            if !region.contains(record.chrom, record.pos) {
                continue;
            }
        }
        if !record.all_present(n_selected) {
            continue;
        }
        if record.is_good() {
            good_reservoir.offer(record.values.clone(), &mut rng);
        } else {
            let mask = learning_filter.evaluate(&record.values, &record.missing);
            if mask == 0 {
                learn_reservoir.offer(record.values.clone(), &mut rng);
            }
        }
        spinner.inc(1);
    }
    spinner.finish_and_clear();

    let n_good = good_reservoir.len();
    let n_learn = learn_reservoir.len();
    let n_actual = (n_good + n_learn) as u64;
    let n_total = if n_actual < options.n_total {
        warn!(
            "capping training size to {n_actual} available vectors ({n_good} good, {n_learn} learn), requested {}",
            options.n_total
        );
        n_actual.max(1)
    } else {
        options.n_total
    };

    info!("training SOM ensemble on {n_good} good + {n_learn} learn-filter vectors (N={n_total})");

    let config = SomConfig {
        bins: options.bins,
        dims: som_slots.len(),
        ensemble: options.ensemble,
        learn_rate0: options.learn_rate0,
        activation_threshold: options.activation_threshold,
        total_updates: n_total,
        seed: if options.seed == 0 { 1 } else { options.seed },
    };
    let mut ensemble = SomEnsemble::new(config);

    let project = |values: &[f64]| -> Vec<f64> {
        som_slots.iter().map(|&slot| values[slot]).collect()
    };

    for v in &good_reservoir.items {
        ensemble.train_one(&project(v));
    }
    for v in &learn_reservoir.items {
        ensemble.train_one(&project(v));
    }
    ensemble.normalize();

    Ok(ensemble)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::catalog::AnnotationCatalog;
    use std::io::Write;

    fn write_table(n_good: usize, n_bad: usize) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "#[1]CHROM\t[2]POS\t[3]MASK\t[4]REF\t[5]ALT\t[6]QUAL").unwrap();
        for i in 0..n_good {
            writeln!(f, "chr1\t{i}\t1\tA\tG\t{}", 30.0 + i as f64 % 5.0).unwrap();
        }
        for i in 0..n_bad {
            writeln!(f, "chr1\t{}\t0\tA\tG\t{}", 10_000 + i, 5.0 + i as f64 % 5.0).unwrap();
        }
        f
    }

    #[test]
    fn reservoir_respects_fraction() {
        let f = write_table(1000, 1000);
        let header: Vec<String> = vec!["CHROM", "POS", "MASK", "REF", "ALT", "QUAL"]
            .into_iter()
            .map(String::from)
            .collect();
        let mut catalog = AnnotationCatalog::build(&header, &["QUAL".to_owned()]).unwrap();
        let learning_filter =
            FilterExpr::parse("QUAL>0", &mut catalog, &header, true, |_| None).unwrap();

        let options = TrainerOptions {
            n_total: 1000,
            learn_fraction: 0.3,
            seed: 7,
            bins: 4,
            ensemble: 1,
            learn_rate0: 0.1,
            activation_threshold: 0.2,
        };
        let ensemble = train(
            f.path(),
            &["QUAL".to_owned()],
            GoodMask::parse("1"),
            vec![Scaler::new(0.0, 40.0)],
            &[0],
            &learning_filter,
            options,
            None,
        )
        .unwrap();
        assert_eq!(ensemble.config().total_updates, 1000);
    }

    #[test]
    fn caps_n_when_good_reservoir_underfilled() {
        let f = write_table(400, 1000);
        let header: Vec<String> = vec!["CHROM", "POS", "MASK", "REF", "ALT", "QUAL"]
            .into_iter()
            .map(String::from)
            .collect();
        let mut catalog = AnnotationCatalog::build(&header, &["QUAL".to_owned()]).unwrap();
        let learning_filter =
            FilterExpr::parse("QUAL>0", &mut catalog, &header, true, |_| None).unwrap();

        let options = TrainerOptions {
            n_total: 1000,
            learn_fraction: 0.3,
            seed: 7,
            bins: 4,
            ensemble: 1,
            learn_rate0: 0.1,
            activation_threshold: 0.2,
        };
        let ensemble = train(
            f.path(),
            &["QUAL".to_owned()],
            GoodMask::parse("1"),
            vec![Scaler::new(0.0, 40.0)],
            &[0],
            &learning_filter,
            options,
            None,
        )
        .unwrap();
        assert_eq!(ensemble.config().total_updates, 700);
    }
}
