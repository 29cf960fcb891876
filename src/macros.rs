/// Implements [`Record`](crate::Record) for a struct embedding a
/// [`RecordMeta`](crate::RecordMeta).
///
/// ```
/// use rustfiledb::{RecordMeta, impl_record};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Order {
///     #[serde(flatten)]
///     meta: RecordMeta,
///     number: String,
/// }
///
/// impl_record!(Order, meta, number: String);
/// ```
///
/// The optional fourth argument overrides the configured field name, for
/// entities whose key is configured under a different spelling (`ID` for `id`).
#[macro_export]
macro_rules! impl_record {
    ($ty:ty, $meta:ident, $key:ident : $key_ty:ty) => {
        $crate::impl_record!($ty, $meta, $key: $key_ty, stringify!($key));
    };
    ($ty:ty, $meta:ident, $key:ident : $key_ty:ty, $field_name:expr) => {
        impl $crate::Record for $ty {
            type PrimaryKey = $key_ty;
            const PRIMARY_KEY_FIELD: &'static str = $field_name;

            fn meta(&self) -> &$crate::RecordMeta {
                &self.$meta
            }

            fn meta_mut(&mut self) -> &mut $crate::RecordMeta {
                &mut self.$meta
            }

            fn primary_key(&self) -> $key_ty {
                ::std::clone::Clone::clone(&self.$key)
            }
        }
    };
}
