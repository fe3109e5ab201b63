/// This module turns the caller's query into the query the backend executes.
///
/// The pipeline has three steps:
/// 1. **Parsing** (`parser`): the query string becomes a `PatternInfo`.
/// 2. **Translation** (`translate`): the `PatternInfo` becomes a backend `Query` tree.
///    Unsupported syntax stops here with a `QueryTranslation` error.
/// 3. **Composition** (`compose`): the translated query is ANDed with a restriction to the
///    caller's repositories, after narrowing that restriction by any `repohasfile` filters.
///
/// ```rust,ignore
/// let info = parser::parse("needle file:\\.rs$")?;
/// let q = translate::to_backend_query(&info, false)?;
/// let final_query = compose::compose(compose::restrict_to(&repos), q);
/// ```
pub mod ast;
pub mod compose;
pub mod parser;
pub mod translate;

pub use ast::{Query, RepoSet, Regexp, Substring};
pub use parser::{parse, PatternInfo, ResultType};
pub use translate::to_backend_query;
