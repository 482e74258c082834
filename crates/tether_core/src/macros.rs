/// Describe a struct to the bridge.
///
/// Lists the fields visible to script (in declaration order, optionally
/// renamed with `#[script_field = "..."]`) and the methods script may call.
/// Implements `HostStruct` and `HostType` for the struct, which must be
/// `Default + Clone + Send + 'static`.
///
/// # Example
/// ```ignore
/// #[derive(Clone, Default)]
/// struct Player { name: String, hp: i32 }
///
/// impl Player {
///     fn heal(&mut self, amount: i32) -> i32 { self.hp += amount; self.hp }
/// }
///
/// host_struct!(Player {
///     #[script_field = "displayName"]
///     name: String,
///     hp: i32,
/// } methods {
///     fn heal(&mut self, amount: i32) -> i32;
/// });
/// ```
#[macro_export]
macro_rules! host_struct {
    (
        $name:ident {
            $( $(#[script_field = $tag:literal])? $field:ident : $fty:ty ),* $(,)?
        }
        $( methods {
            $( fn $method:ident ( & $(mut)? self $(, $param:ident : $pty:ty)* $(,)? ) $(-> $ret:ty)? ; )*
        } )?
    ) => {
        impl $crate::HostStruct for $name {
            fn describe() -> &'static $crate::StructDescriptor {
                static DESCRIPTOR: $crate::__private::Lazy<$crate::StructDescriptor> =
                    $crate::__private::Lazy::new(|| {
                        $crate::StructDescriptor::builder::<$name>(stringify!($name))
                            $(
                                .field::<$fty>(
                                    stringify!($field),
                                    $crate::__private::tag(&[$($tag)?]),
                                )
                            )*
                            $($(
                                .method($crate::MethodDescriptor::new(
                                    stringify!($method),
                                    $crate::FunctionSignature::new(
                                        vec![$($crate::resolve::<$pty>()),*],
                                        $crate::__private::is_variadic(
                                            &[$(<$pty as $crate::HostType>::IS_REST),*],
                                        ),
                                        <($($ret)?) as $crate::HostReturn>::descriptors(),
                                    ),
                                    |target: &$crate::StructRef,
                                     args: ::std::vec::Vec<$crate::HostValue>|
                                     -> ::std::result::Result<
                                        ::std::vec::Vec<$crate::HostValue>,
                                        $crate::CallError,
                                    > {
                                        let shared = target.downcast::<$name>().ok_or(
                                            $crate::CallError::Receiver {
                                                expected: stringify!($name),
                                            },
                                        )?;
                                        #[allow(unused_mut, unused_variables)]
                                        let mut args = args.into_iter();
                                        #[allow(unused_mut, unused_variables)]
                                        let mut index = 0usize;
                                        $(
                                            let $param: $pty =
                                                $crate::__private::take_arg(&mut args, &mut index)?;
                                        )*
                                        let result = {
                                            #[allow(unused_mut)]
                                            let mut guard = shared.lock();
                                            guard.$method($($param),*)
                                        };
                                        $crate::HostReturn::into_host_values(result)
                                    },
                                ))
                            )*)?
                            .build()
                    });
                &DESCRIPTOR
            }

            fn descriptor(&self) -> &'static $crate::StructDescriptor {
                <Self as $crate::HostStruct>::describe()
            }

            #[allow(unused_mut, unused_variables, unused_assignments)]
            fn field(&self, index: usize) -> $crate::HostValue {
                let mut position = 0usize;
                $(
                    if index == position {
                        return $crate::HostType::to_host(&self.$field);
                    }
                    position += 1;
                )*
                $crate::HostValue::Undefined
            }

            #[allow(unused_mut, unused_variables, unused_assignments)]
            fn store_field(
                &mut self,
                index: usize,
                value: ::std::boxed::Box<dyn ::std::any::Any + ::std::marker::Send>,
            ) -> bool {
                let mut position = 0usize;
                $(
                    if index == position {
                        return match value.downcast::<$fty>() {
                            Ok(converted) => {
                                self.$field = *converted;
                                true
                            }
                            Err(_) => false,
                        };
                    }
                    position += 1;
                )*
                false
            }
        }

        impl $crate::HostType for $name {
            fn descriptor() -> $crate::TypeDescriptor {
                $crate::TypeDescriptor::Struct($crate::StructType::new(
                    ::std::any::TypeId::of::<$name>(),
                    stringify!($name),
                    <$name as $crate::HostStruct>::describe,
                ))
            }

            fn to_host(&self) -> $crate::HostValue {
                $crate::HostValue::Struct($crate::StructRef::new($crate::shared(
                    ::std::clone::Clone::clone(self),
                )))
            }

            fn from_host(value: $crate::HostValue) -> ::std::option::Option<Self> {
                match value {
                    $crate::HostValue::Struct(target) => {
                        let shared = target.downcast::<$name>()?;
                        let copy = ::std::clone::Clone::clone(&*shared.lock());
                        Some(copy)
                    }
                    _ => None,
                }
            }
        }
    };
}
