use crate::table::schema::Schema;
use crate::traits::codec::Codec;

/// A record type that can be stored in a [`crate::table::Table`].
///
/// The schema names the primary id field and every indexed field. It is
/// resolved once, when the table is registered, and cached by the table.
///
/// ```rust,ignore
/// impl Record for Book {
///     fn schema() -> DbResult<Schema<Self>> {
///         Schema::builder()
///             .primary("id", |b: &Book| b.id, |b: &mut Book, id| b.id = id)
///             .index("year", |b: &Book| b.year)
///             .unique_index("published", |b: &Book| b.published)
///             .build()
///     }
/// }
/// ```
pub trait Record: Codec + Send + Sync + 'static {
    fn schema() -> crate::errors::DbResult<Schema<Self>>;
}
