//! # Criteria Compiler
//!
//! Compiles frozen relational query expression trees into the call stream
//! of a criteria-builder API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │           Expression tree (Expr + QueryMetadata)         │
//! │   (joins, clauses, CTE / set-operation / window flags)   │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compiler: CTE pre-pass]
//! ┌─────────────────────────────────────────────────────────┐
//! │        with / with_recursive bodies, inner first         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [compiler: visit]
//! ┌─────────────────────────────────────────────────────────┐
//! │  joins ─ windows ─ where ─ group by ─ having ─ select     │
//! │  set operations, bracketed operands, subquery labels     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [serializer + operator table]
//! ┌─────────────────────────────────────────────────────────┐
//! │        CriteriaBuilder calls + constant Bindings         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod builder;
pub mod compiler;
pub mod config;
pub mod error;
pub mod expr;
pub mod metamodel;
pub mod query;
pub mod serializer;
pub mod session;
pub mod templates;
pub mod window;

pub use compiler::{CompileOptions, CompiledQuery, QueryCompiler};
pub use error::{BuildError, BuildResult, CompileError, CompileResult};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::builder::{
        BuilderCall, CriteriaBuilder, FrameBoundArg, FromNode, JoinKind, LateralTarget,
        RecordingBuilder,
    };
    pub use crate::compiler::{CompileOptions, CompiledQuery, QueryCompiler};
    pub use crate::config::{CompilerSettings, LabelSettings, RenderingSettings};
    pub use crate::error::{BuildError, CompileError, CompileResult};
    pub use crate::expr::{
        // Constructors
        all,
        any,
        avg,
        coalesce,
        constant,
        count,
        count_distinct,
        dateadd,
        datediff,
        datetrunc,
        dense_rank,
        except,
        exists,
        intersect,
        lag,
        lead,
        left_nested_set_operation,
        literal,
        lower,
        max,
        min,
        param,
        rank,
        row_number,
        set_operation,
        sum,
        treat,
        type_of,
        union,
        union_all,
        upper,
        // Types
        DatePart,
        Expr,
        ExprExt,
        ExprKind,
        Operator,
        Path,
        SetOperationKind,
        Value,
    };
    pub use crate::metamodel::{AttributeInfo, EntityMetamodel, StaticMetamodel};
    pub use crate::query::{
        CteDeclaration, JoinExpression, JoinType, NullHandling, OrderSpecifier, QueryMetadata,
        ValuesSource,
    };
    pub use crate::session::{Bindings, ConstantBinding};
    pub use crate::templates::{JpqlTemplates, OperatorTable, Template};
    pub use crate::window::{FrameMode, WindowDefinition};
}
