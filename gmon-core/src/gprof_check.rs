use crate::binary::Binary;

const MCOUNT: [&str; 3] = ["mcount", "_mcount", "__mcount"];
const MCLEANUP: [&str; 3] = ["mcleanup", "_mcleanup", "__mcleanup"];

/// Which gprof runtime hooks a program references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GprofSupport {
    pub mcount: bool,
    pub mcleanup: bool,
}

impl GprofSupport {
    /// Scans defined function names and undefined (imported) names.
    /// Imported names may carry a symbol version, e.g. `mcount@@GLIBC_2.2.5`.
    pub fn scan<'a, D, U>(defined: D, undefined: U) -> Self
    where
        D: IntoIterator<Item = &'a str>,
        U: IntoIterator<Item = &'a str>,
    {
        let mut support = Self::default();
        for name in defined {
            support.note(name);
        }
        for name in undefined {
            support.note(unversioned(name));
        }
        support
    }

    pub fn of(binary: &Binary) -> Self {
        Self::scan(
            binary.symbols.iter().map(|(_, f)| f.name.as_str()),
            binary.undefined_symbols.iter().map(String::as_str),
        )
    }

    fn note(&mut self, name: &str) {
        if MCOUNT.contains(&name) {
            self.mcount = true;
        } else if MCLEANUP.contains(&name) {
            self.mcleanup = true;
        }
    }

    /// Both hooks present: the program was built with `-pg`.
    pub fn is_compatible(&self) -> bool {
        self.mcount && self.mcleanup
    }
}

fn unversioned(name: &str) -> &str {
    name.split_once('@').map_or(name, |(base, _)| base)
}

pub fn is_gprof_compatible(binary: &Binary) -> bool {
    let support = GprofSupport::of(binary);
    log::debug!("{}: {:?}", binary.path.display(), support);
    support.is_compatible()
}
