// Shared criterion settings for every bench in this directory.

use criterion::Criterion;
use std::time::Duration;

pub fn get_criterion() -> Criterion {
    // Keep runs short; the comparisons of interest differ by large factors.
    Criterion::default()
        .measurement_time(Duration::from_secs(2))
        .warm_up_time(Duration::from_secs(1))
}
