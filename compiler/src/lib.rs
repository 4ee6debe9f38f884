// lfc — Lazy-chain Fusion Compiler
//
// Library root. Front end (lexer, parser, bind), fusion core (assemble,
// render and the per-role stage modules), emission, and the runtime that
// executes fused bodies.

pub mod assemble;
pub mod ast;
pub mod bind;
pub mod bound;
pub mod descriptor;
pub mod diag;
pub mod emit;
pub mod evaluation;
pub mod exec;
pub mod generation;
pub mod id;
pub mod instr;
pub mod ir;
pub mod lexer;
pub mod operation;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod pool;
pub mod reference;
pub mod render;
pub mod rewrite;
pub mod types;
pub mod value;
