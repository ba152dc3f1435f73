use crate::models::FilterId;

/// Apply `filter` to one block.
pub fn forward(filter: FilterId, src: &[u8], typesize: usize) -> Vec<u8> {
    match filter {
        FilterId::NoFilter => src.to_vec(),
        FilterId::Shuffle => shuffle(src, typesize),
        FilterId::Delta => delta_encode(src, typesize),
    }
}

/// Undo `filter` on one block.
pub fn backward(filter: FilterId, src: &[u8], typesize: usize) -> Vec<u8> {
    match filter {
        FilterId::NoFilter => src.to_vec(),
        FilterId::Shuffle => unshuffle(src, typesize),
        FilterId::Delta => delta_decode(src, typesize),
    }
}

/// Group byte `j` of every element together.
///
/// Trailing bytes that do not fill a whole element are copied unchanged.
pub fn shuffle(src: &[u8], typesize: usize) -> Vec<u8> {
    if typesize <= 1 || src.len() < typesize {
        return src.to_vec();
    }
    let nelems = src.len() / typesize;
    let body = nelems * typesize;
    let mut out = vec![0u8; src.len()];

    for i in 0..nelems {
        for j in 0..typesize {
            out[j * nelems + i] = src[i * typesize + j];
        }
    }
    out[body..].copy_from_slice(&src[body..]);
    out
}

pub fn unshuffle(src: &[u8], typesize: usize) -> Vec<u8> {
    if typesize <= 1 || src.len() < typesize {
        return src.to_vec();
    }
    let nelems = src.len() / typesize;
    let body = nelems * typesize;
    let mut out = vec![0u8; src.len()];

    for i in 0..nelems {
        for j in 0..typesize {
            out[i * typesize + j] = src[j * nelems + i];
        }
    }
    out[body..].copy_from_slice(&src[body..]);
    out
}

/// Replace each byte with its wrapping difference from the same byte of the previous element.
pub fn delta_encode(src: &[u8], typesize: usize) -> Vec<u8> {
    let stride = typesize.max(1);
    let mut out = src.to_vec();
    for i in stride..src.len() {
        out[i] = src[i].wrapping_sub(src[i - stride]);
    }
    out
}

pub fn delta_decode(src: &[u8], typesize: usize) -> Vec<u8> {
    let stride = typesize.max(1);
    let mut out = src.to_vec();
    for i in stride..out.len() {
        out[i] = out[i].wrapping_add(out[i - stride]);
    }
    out
}
