// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! An in-memory, columnar, read-only analytics collection and its
//! embedded query engine.
//!
//! A caller supplies an immutable [`schema::ColumnStore`] snapshot; this
//! crate turns a surface query into a logical plan, optimizes it, picks a
//! physical execution strategy, and runs it against the snapshot's
//! columns, handing the caller back a [`render::QueryResult`] it can feed
//! to any [`render::Renderer`].
//!
//! The pipeline, leaves first: [`bitmap`] (the row-set representation),
//! [`zonemap`] (per-chunk min/max pruning), [`predicate`] (typed,
//! vectorized row tests), [`plan`] (the logical plan plus its optimizer),
//! [`translator`] (surface AST → logical plan), [`physical`] (strategy
//! selection), [`executor`] (the kernels that actually run), [`cache`]
//! (logical-plan memoization), and [`engine`], the facade tying all of the
//! above into one `execute` call.
//!
//! The column store itself, the columnar write path that builds it, its
//! wire/on-disk format, and the surface-language query binding are all
//! external collaborators this crate reaches only through the traits in
//! [`schema`], [`translator`], and [`render`].

pub mod bitmap;
pub mod cache;
pub mod cancellation;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod physical;
pub mod plan;
pub mod predicate;
pub mod render;
pub mod schema;
pub mod translator;
pub mod value;
pub mod zonemap;

pub use bitmap::{BitmapPool, Initial, SelectionBitmap};
pub use cache::PlanCache;
pub use cancellation::CancellationToken;
pub use config::EngineConfig;
pub use engine::{EngineResult, QueryEngine};
pub use error::{EngineError, Result};
pub use plan::LogicalPlanNode;
pub use physical::PhysicalPlan;
pub use predicate::ColumnPredicate;
pub use render::{QueryResult, Renderer, RowSelection};
pub use schema::{ColumnRef, ColumnStore, LogicalType, Schema, SchemaRef};
pub use translator::{translate, SurfaceQuery, TerminalOp};
pub use value::ScalarValue;
pub use zonemap::SnapshotZoneMaps;
