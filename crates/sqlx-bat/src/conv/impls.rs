use crate::{
    DbRepresentable, Error, Result, TryFromDb, TryFromDbImp, TryIntoApp, TryIntoDb, TryIntoDbImp,
};
use std::any::type_name;

impl<A: TryFromDb> TryIntoApp<A> for A::DbRepr {
    fn try_into_app(self) -> Result<A> {
        A::try_from_db(self)
    }
}

impl<A: TryIntoDbImp> TryIntoDb for A {
    fn try_into_db(self) -> Result<Self::DbRepr> {
        let app_val_dbg = format!("{self:#?}");
        self.try_into_db_imp().map_err(|source| Error::Serialize {
            source: Box::new(source),
            app_ty: type_name::<Self>(),
            db_ty: type_name::<Self::DbRepr>(),
            app_val: app_val_dbg,
        })
    }
}

impl<A: TryFromDbImp> TryFromDb for A {
    fn try_from_db(db_val: Self::DbRepr) -> Result<Self> {
        let db_val_dbg = format!("{db_val:#?}");
        Self::try_from_db_imp(db_val).map_err(|source| Error::Deserialize {
            source: Box::new(source),
            app_ty: type_name::<Self>(),
            db_ty: type_name::<Self::DbRepr>(),
            db_val: db_val_dbg,
        })
    }
}

impl<T: DbRepresentable> DbRepresentable for Option<T> {
    type DbRepr = Option<T::DbRepr>;
}

impl<T: TryFromDb> TryFromDb for Option<T> {
    fn try_from_db(val: Self::DbRepr) -> Result<Self> {
        val.map(<_>::try_from_db).transpose()
    }
}

impl<T: TryIntoDb> TryIntoDb for Option<T> {
    fn try_into_db(self) -> Result<Self::DbRepr> {
        self.map(<_>::try_into_db).transpose()
    }
}

/// Values that are stored in the database exactly as they are in the app
macro_rules! impl_identity {
    ($($ty:ty),* $(,)?) => {$(
        impl DbRepresentable for $ty {
            type DbRepr = $ty;
        }

        impl TryIntoDbImp for $ty {
            type Err = std::convert::Infallible;

            fn try_into_db_imp(self) -> Result<Self::DbRepr, Self::Err> {
                Ok(self)
            }
        }

        impl TryFromDbImp for $ty {
            type Err = std::convert::Infallible;

            fn try_from_db_imp(db_val: Self::DbRepr) -> Result<Self, Self::Err> {
                Ok(db_val)
            }
        }
    )*};
}

impl_identity!(i16, i32, i64, bool, String);

#[macro_export]
macro_rules! impl_try_into_db_via_newtype {
    ($app_ident:ident($app_ty:ty)) => {
        impl $crate::DbRepresentable for $app_ident {
            type DbRepr = <$app_ty as $crate::DbRepresentable>::DbRepr;
        }

        impl $crate::TryIntoDb for $app_ident {
            fn try_into_db(self) -> $crate::Result<Self::DbRepr> {
                $crate::TryIntoDb::try_into_db(self.0)
            }
        }

        impl $crate::TryFromDb for $app_ident {
            fn try_from_db(db_val: Self::DbRepr) -> $crate::Result<Self> {
                $crate::TryFromDb::try_from_db(db_val).map($app_ident)
            }
        }
    };
}

/// Implements the conversion for enums that are stored as text columns.
/// The app type must implement [`std::str::FromStr`] and [`Into<&'static str>`]
/// (e.g. via `strum::EnumString` and `strum::IntoStaticStr`).
#[macro_export]
macro_rules! impl_try_into_from_db_via_str {
    ($app_ty:ty) => {
        impl $crate::DbRepresentable for $app_ty {
            type DbRepr = ::std::string::String;
        }

        impl $crate::TryIntoDbImp for $app_ty {
            type Err = ::std::convert::Infallible;

            fn try_into_db_imp(self) -> ::std::result::Result<Self::DbRepr, Self::Err> {
                let str: &'static str = self.into();
                Ok(str.to_owned())
            }
        }

        impl $crate::TryFromDbImp for $app_ty {
            type Err = <Self as ::std::str::FromStr>::Err;

            fn try_from_db_imp(db_val: Self::DbRepr) -> ::std::result::Result<Self, Self::Err> {
                db_val.parse()
            }
        }
    };
}
