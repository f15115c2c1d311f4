// convmat: dense GPU matrix multiplication reused for 3x3 convolution
// filters via neighborhood unrolling (im2col).
//
// One compute kernel does all the work: a dense single-precision matrix
// multiply. Convolution over a 2-D grid is expressed as a multiply by
// unrolling each cell's 3x3 neighborhood (zero-padded at borders) into a
// row of a (R*C)x9 matrix and multiplying against a 9x1 weight vector.
//
// The CPU implementation in `reference` is the authoritative oracle: the
// GPU path is validated against it element-for-element to 1e-5.

pub mod matrix;
pub mod reference;
pub mod unroll;
pub mod filter;

pub mod gpu;
