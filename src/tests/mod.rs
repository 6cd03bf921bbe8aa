//! Cross-module integration scenarios from spec §8, mirroring the teacher's
//! `src/tests/{node_type,iterator}.rs` split: small focused checks live next to their module in
//! `#[cfg(test)] mod tests` blocks, and the larger end-to-end scenarios live here.
