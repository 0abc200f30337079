pub mod local_attention;
pub mod module;

pub use local_attention::LocalSelfAttention2d;
pub use module::Module;
