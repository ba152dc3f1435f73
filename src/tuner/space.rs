use crate::models::{CodecId, CompressionParams, FilterId, ParamSeed, Pinned};

/// Block sizes explored by default, before alignment to the typesize.
pub const DEFAULT_BLOCK_SIZES: [usize; 8] = [
    8 * 1024,
    16 * 1024,
    32 * 1024,
    64 * 1024,
    128 * 1024,
    256 * 1024,
    512 * 1024,
    1024 * 1024,
];

/// Which dimensions a neighborhood may move along.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every dimension, codec and filter included.
    All,
    /// Level, block size and threads only; codec and filter stay fixed.
    Current,
}

/// The discrete set of params the tuner may pick from.
///
/// Built from the caller's seed: typesize and every pinned field come from
/// the seed, and `seed.nthreads` is the most threads any candidate may use.
#[derive(Debug, Clone)]
pub struct ParameterSpace {
    seed: CompressionParams,
    pinned: Pinned,
    codecs: Vec<CodecId>,
    filters: Vec<FilterId>,
    block_sizes: Vec<usize>,
    max_threads: usize,
}

/// Round `size` down to a whole number of elements, never below one element.
fn align_block(size: usize, typesize: usize) -> usize {
    let typesize = typesize.max(1);
    (size - size % typesize).max(typesize)
}

impl ParameterSpace {
    pub fn new(seed: &ParamSeed) -> Self {
        let space = Self {
            seed: seed.params,
            pinned: seed.pinned,
            codecs: CodecId::ALL.to_vec(),
            filters: FilterId::ALL.to_vec(),
            block_sizes: Vec::new(),
            max_threads: seed.params.nthreads.max(1),
        };
        space.with_block_sizes(&DEFAULT_BLOCK_SIZES)
    }

    /// Restrict the codecs explored. The seed's codec is always kept.
    pub fn with_codecs(mut self, codecs: &[CodecId]) -> Self {
        self.codecs = codecs.to_vec();
        if !self.codecs.contains(&self.seed.codec) {
            self.codecs.push(self.seed.codec);
        }
        self.codecs.sort();
        self.codecs.dedup();
        self
    }

    /// Restrict the filters explored. The seed's filter is always kept.
    pub fn with_filters(mut self, filters: &[FilterId]) -> Self {
        self.filters = filters.to_vec();
        if !self.filters.contains(&self.seed.filter) {
            self.filters.push(self.seed.filter);
        }
        self.filters.sort();
        self.filters.dedup();
        self
    }

    pub fn with_block_sizes(mut self, sizes: &[usize]) -> Self {
        let typesize = self.seed.typesize;
        let mut sizes: Vec<usize> = sizes
            .iter()
            .filter(|&&s| s > 0)
            .map(|&s| align_block(s, typesize))
            .collect();
        if sizes.is_empty() {
            sizes.push(align_block(self.seed.blocksize.max(1), typesize));
        }
        sizes.sort_unstable();
        sizes.dedup();
        self.block_sizes = sizes;
        self
    }

    pub fn seed(&self) -> &CompressionParams {
        &self.seed
    }

    pub fn pinned(&self) -> &Pinned {
        &self.pinned
    }

    pub fn max_threads(&self) -> usize {
        self.max_threads
    }

    fn min_block(&self) -> usize {
        self.block_sizes.first().copied().unwrap_or(self.seed.typesize.max(1))
    }

    fn max_block(&self) -> usize {
        self.block_sizes.last().copied().unwrap_or(self.seed.blocksize)
    }

    /// Whether `p` is structurally valid and respects the seed.
    pub fn is_valid(&self, p: &CompressionParams) -> bool {
        let typesize = self.seed.typesize;
        let pins_hold = (!self.pinned.codec || p.codec == self.seed.codec)
            && (!self.pinned.filter || p.filter == self.seed.filter)
            && (!self.pinned.level || p.level == self.seed.level)
            && (!self.pinned.blocksize || p.blocksize == self.seed.blocksize)
            && (!self.pinned.nthreads || p.nthreads == self.seed.nthreads);

        pins_hold
            && typesize > 0
            && p.typesize == typesize
            && self.codecs.contains(&p.codec)
            && self.filters.contains(&p.filter)
            && p.codec.level_range().contains(&p.level)
            && p.blocksize > 0
            && p.blocksize % typesize == 0
            && (1..=self.max_threads).contains(&p.nthreads)
    }

    /// Force pinned fields, clamp level and threads, align the block size,
    /// and return the result if it is then valid.
    pub fn sanitize(&self, p: &CompressionParams) -> Option<CompressionParams> {
        let mut out = self.pinned.overlay(&self.seed, p);
        if !self.pinned.nthreads {
            out.nthreads = out.nthreads.clamp(1, self.max_threads);
        }
        if !self.pinned.blocksize && out.blocksize > 0 {
            out.blocksize = align_block(out.blocksize, out.typesize);
        }
        self.is_valid(&out).then_some(out)
    }

    fn thread_steps(&self) -> Vec<usize> {
        if self.pinned.nthreads {
            return vec![self.seed.nthreads];
        }
        let mut steps = Vec::new();
        let mut n = 1;
        while n < self.max_threads {
            steps.push(n);
            n *= 2;
        }
        steps.push(self.max_threads);
        steps
    }

    /// Every valid combination, in a fixed order: codec, filter, level, block size, threads.
    pub fn enumerate_candidates(&self) -> Vec<CompressionParams> {
        let codecs = if self.pinned.codec {
            vec![self.seed.codec]
        } else {
            self.codecs.clone()
        };
        let filters = if self.pinned.filter {
            vec![self.seed.filter]
        } else {
            self.filters.clone()
        };
        let block_sizes = if self.pinned.blocksize {
            vec![self.seed.blocksize]
        } else {
            self.block_sizes.clone()
        };
        let threads = self.thread_steps();

        let mut out = Vec::new();
        for &codec in &codecs {
            let levels: Vec<u8> = if self.pinned.level {
                vec![self.seed.level]
            } else {
                codec.level_range().collect()
            };
            for &filter in &filters {
                for &level in &levels {
                    for &blocksize in &block_sizes {
                        for &nthreads in &threads {
                            let p = CompressionParams {
                                codec,
                                filter,
                                level,
                                blocksize,
                                typesize: self.seed.typesize,
                                nthreads,
                            };
                            if self.is_valid(&p) {
                                out.push(p);
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Local perturbations of `p` along every unpinned dimension.
    pub fn neighbors(&self, p: &CompressionParams) -> Vec<CompressionParams> {
        self.neighbors_in(p, Scope::All)
    }

    /// Local perturbations of `p`: level up/down, block size halved/doubled,
    /// threads halved/doubled, and for [`Scope::All`] every other filter and codec.
    pub fn neighbors_in(&self, p: &CompressionParams, scope: Scope) -> Vec<CompressionParams> {
        let mut out: Vec<CompressionParams> = Vec::new();
        let mut push = |candidate: CompressionParams| {
            if candidate != *p && self.is_valid(&candidate) && !out.contains(&candidate) {
                out.push(candidate);
            }
        };

        if !self.pinned.level {
            let range = p.codec.level_range();
            if p.level > *range.start() {
                push(CompressionParams {
                    level: p.level - 1,
                    ..*p
                });
            }
            if p.level < *range.end() {
                push(CompressionParams {
                    level: p.level + 1,
                    ..*p
                });
            }
        }

        if !self.pinned.blocksize {
            let half = align_block(p.blocksize / 2, p.typesize);
            if half >= self.min_block() {
                push(CompressionParams {
                    blocksize: half,
                    ..*p
                });
            }
            let double = align_block(p.blocksize.saturating_mul(2), p.typesize);
            if double <= self.max_block() {
                push(CompressionParams {
                    blocksize: double,
                    ..*p
                });
            }
        }

        if !self.pinned.nthreads {
            push(CompressionParams {
                nthreads: (p.nthreads / 2).max(1),
                ..*p
            });
            push(CompressionParams {
                nthreads: (p.nthreads * 2).min(self.max_threads),
                ..*p
            });
        }

        if scope == Scope::All {
            if !self.pinned.filter {
                for &filter in &self.filters {
                    push(CompressionParams { filter, ..*p });
                }
            }
            if !self.pinned.codec {
                for &codec in &self.codecs {
                    let level = if self.pinned.level {
                        p.level
                    } else {
                        codec.clamp_level(p.level)
                    };
                    push(CompressionParams {
                        codec,
                        level,
                        ..*p
                    });
                }
            }
        }

        out
    }
}
