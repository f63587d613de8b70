use once_cell::sync::Lazy;

use crate::MonomerLibrary;

pub static LIBRARY: Lazy<MonomerLibrary> = Lazy::new(|| MonomerLibrary::embedded().unwrap());

macro_rules! assert_miette_labels {
    ($diag:expr, [$($label:expr),* $(,)?]) => {{
        use miette::Diagnostic;

        let labels: Vec<String> = $diag
            .labels()
            .into_iter()
            .flatten()
            .filter_map(|l| l.label().map(str::to_owned))
            .collect();
        let expected: Vec<&str> = vec![$($label),*];
        assert_eq!(labels, expected, "labels of {}", stringify!($diag));
    }};
}

pub(crate) use assert_miette_labels;
