//! Block-local attention over 2-D feature maps.
//!
//! Spectrogram features are laid out as `[batch, heads, time, frequency, depth]`. Full
//! self-attention over `time * frequency` positions is quadratic in the grid size, so this
//! module restricts every query to a neighbourhood:
//!
//! 1. The grid is cut into non-overlapping **query blocks** of `query_shape`.
//! 2. Each query block attends to a **memory block**: the same region widened by
//!    `memory_flange` on every side.
//! 3. Blocks are independent, so all of them run as one batched matmul.
//!
//! ```text
//!         memory block (query + flange)
//!     +---------------------------+
//!     |  flange                   |
//!     |     +-----------+         |
//!     |     |   query   |         |
//!     |     |   block   |         |
//!     |     +-----------+         |
//!     |                           |
//!     +---------------------------+
//! ```
//!
//! - [`blocks`]: index maps and the gather/scatter that move rows in and out of blocks.
//! - [`dot_product`]: biased softmax attention with dropout and mixed-precision handling.
//! - [`local_2d`]: the orchestrator tying both together.

pub mod blocks;
pub mod dot_product;
pub mod local_2d;

pub use blocks::{embedding_to_padding, gather_blocks_2d, gather_indices_2d, scatter_blocks_2d};
pub use dot_product::{
    AttentionWeights, DotProductAttention, dot_product_attention, dropout_with_broadcast_dims,
};
pub use local_2d::{LocalAttention2d, local_attention_2d};
