/// Implement [`HasName`](crate::HasName) and `Display` for a task struct
/// with a `name: Option<String>` field and a [`TaskKind`](crate::TaskKind)
/// impl.
///
/// ```ignore
/// define_task!(Vpc);
/// assert_eq!(vpc.to_string(), "vpc:main");
/// ```
#[macro_export]
macro_rules! define_task {
  ($ty:ty) => {
    impl $crate::HasName for $ty {
      fn name(&self) -> ::std::option::Option<&str> {
        self.name.as_deref()
      }

      fn set_name(&mut self, name: ::std::string::String) {
        self.name = ::std::option::Option::Some(name);
      }
    }

    impl ::std::fmt::Display for $ty {
      fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
        $crate::display_task(
          f,
          <$ty as $crate::TaskKind>::KIND,
          self.name.as_deref(),
        )
      }
    }
  };
}
