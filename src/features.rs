use std::fmt;

/// A piece of optional data stored in a perf.data file. Its data is contained in a
/// "feature section" after the data section.
///
/// For each used feature, a bit is set in the feature flags in the file header.
/// There's one section for each enabled feature, ordered from low feature bit
/// to high feature bit.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Feature(pub u32);

impl Feature {
    pub const TRACING_DATA: Self = Self(1);
    pub const BUILD_ID: Self = Self(2);
    pub const HOSTNAME: Self = Self(3);
    pub const OSRELEASE: Self = Self(4);
    pub const VERSION: Self = Self(5);
    pub const ARCH: Self = Self(6);
    pub const NRCPUS: Self = Self(7);
    pub const CPUDESC: Self = Self(8);
    pub const CPUID: Self = Self(9);
    pub const TOTAL_MEM: Self = Self(10);
    pub const CMDLINE: Self = Self(11);
    pub const EVENT_DESC: Self = Self(12);
    pub const CPU_TOPOLOGY: Self = Self(13);
    pub const NUMA_TOPOLOGY: Self = Self(14);
    pub const BRANCH_STACK: Self = Self(15);
    pub const PMU_MAPPINGS: Self = Self(16);
    pub const GROUP_DESC: Self = Self(17);
    pub const AUXTRACE: Self = Self(18);
    pub const STAT: Self = Self(19);
    pub const CACHE: Self = Self(20);
    pub const SAMPLE_TIME: Self = Self(21);
    pub const SAMPLE_TOPOLOGY: Self = Self(22);
    pub const CLOCKID: Self = Self(23);
    pub const DIR_FORMAT: Self = Self(24);
    pub const BPF_PROG_INFO: Self = Self(25);
    pub const BPF_BTF: Self = Self(26);
    pub const COMPRESSED: Self = Self(27);
    pub const CPU_PMU_CAPS: Self = Self(28);
    pub const CLOCK_DATA: Self = Self(29);
    pub const HYBRID_TOPOLOGY: Self = Self(30);
    pub const HYBRID_CPU_PMU_CAPS: Self = Self(31);
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::TRACING_DATA => "TRACING_DATA",
            Self::BUILD_ID => "BUILD_ID",
            Self::HOSTNAME => "HOSTNAME",
            Self::OSRELEASE => "OSRELEASE",
            Self::VERSION => "VERSION",
            Self::ARCH => "ARCH",
            Self::NRCPUS => "NRCPUS",
            Self::CPUDESC => "CPUDESC",
            Self::CPUID => "CPUID",
            Self::TOTAL_MEM => "TOTAL_MEM",
            Self::CMDLINE => "CMDLINE",
            Self::EVENT_DESC => "EVENT_DESC",
            Self::CPU_TOPOLOGY => "CPU_TOPOLOGY",
            Self::NUMA_TOPOLOGY => "NUMA_TOPOLOGY",
            Self::BRANCH_STACK => "BRANCH_STACK",
            Self::PMU_MAPPINGS => "PMU_MAPPINGS",
            Self::GROUP_DESC => "GROUP_DESC",
            Self::AUXTRACE => "AUXTRACE",
            Self::STAT => "STAT",
            Self::CACHE => "CACHE",
            Self::SAMPLE_TIME => "SAMPLE_TIME",
            Self::SAMPLE_TOPOLOGY => "SAMPLE_TOPOLOGY",
            Self::CLOCKID => "CLOCKID",
            Self::DIR_FORMAT => "DIR_FORMAT",
            Self::BPF_PROG_INFO => "BPF_PROG_INFO",
            Self::BPF_BTF => "BPF_BTF",
            Self::COMPRESSED => "COMPRESSED",
            Self::CPU_PMU_CAPS => "CPU_PMU_CAPS",
            Self::CLOCK_DATA => "CLOCK_DATA",
            Self::HYBRID_TOPOLOGY => "HYBRID_TOPOLOGY",
            Self::HYBRID_CPU_PMU_CAPS => "HYBRID_CPU_PMU_CAPS",
            other => return write!(f, "Unknown Feature {}", other.0),
        };
        f.write_str(name)
    }
}

/// The set of features used in the perf file, from the file header.
///
/// The set has room for 4 * 64 = 256 feature bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureSet(pub [u64; 4]);

impl FeatureSet {
    /// The number of features in this set.
    pub fn len(&self) -> usize {
        self.0.iter().map(|chunk| chunk.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0; 4]
    }

    /// Emits all features in this set, from low to high.
    pub fn iter(&self) -> FeatureSetIter {
        FeatureSetIter {
            current_feature: 0,
            set: *self,
        }
    }

    #[inline]
    pub fn has_feature(&self, feature: Feature) -> bool {
        let Feature(bit) = feature;
        if bit >= 256 {
            return false;
        }
        self.0[(bit / 64) as usize] & (1 << (bit % 64)) != 0
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

pub struct FeatureSetIter {
    current_feature: u32,
    set: FeatureSet,
}

impl Iterator for FeatureSetIter {
    type Item = Feature;

    fn next(&mut self) -> Option<Self::Item> {
        while self.current_feature < 256 {
            let feature = Feature(self.current_feature);
            self.current_feature += 1;
            if self.set.has_feature(feature) {
                return Some(feature);
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::{Feature, FeatureSet};

    #[test]
    fn iterates_set_bits_in_order() {
        let set = FeatureSet([(1 << 3) | (1 << 12), 0, 1, 0]);
        assert_eq!(set.len(), 3);
        assert!(set.has_feature(Feature::HOSTNAME));
        assert!(!set.has_feature(Feature::ARCH));
        let features: Vec<_> = set.iter().collect();
        assert_eq!(
            features,
            vec![Feature::HOSTNAME, Feature::EVENT_DESC, Feature(128)]
        );
        assert_eq!(format!("{:?}", Feature(128)), "Unknown Feature 128");
    }
}
