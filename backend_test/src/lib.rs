use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Which backend the test's Rocket runs over.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Backend {
    Memory,
    Mongo,
}

/// Transform an asynchronous test into a synchronous one and inject
/// dependencies.
///
/// Every test gets a fresh Rocket. By default it runs over a fresh in-memory
/// backend, and injectable dependencies are
/// [`rocket::local::asynchronous::Client`], `crate::store::MemoryBackend`
/// (sharing state with the Rocket) and `crate::notify::RecordingNotifier`
/// (recording whatever the Rocket sent).
///
/// With `#[backend_test(mongo)]` the Rocket runs over a throwaway MongoDB
/// database instead, which is dropped regardless of how the test terminates.
/// `crate::store::MongoBackend` and [`mongodb::Database`] replace
/// `MemoryBackend`. The test is skipped if `ROCKET_DB_URI` is not set.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    let backend = match parse_macro_input!(args as Option<Ident>) {
        None => Backend::Memory,
        Some(arg) if arg == "mongo" => Backend::Mongo,
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected no argument or `mongo`")
                .into_compile_error()
                .into();
        }
    };

    // Extract type information and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone(), backend) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    let init_logging = quote! {
        log4rs_test_utils::test_logging::init_logging_once_for(
            [env!("CARGO_CRATE_NAME")],
            None,
            None,
        );
    };

    // Rewrite the test function.
    match backend {
        Backend::Memory => quote! {
            #[test]
            fn #name() {
                /// Test setup.
                async fn setup() -> (
                    rocket::local::asynchronous::Client,
                    crate::store::MemoryBackend,
                    crate::notify::RecordingNotifier,
                ) {
                    #init_logging

                    let backend = crate::store::MemoryBackend::new();
                    let notifier = crate::notify::RecordingNotifier::new();
                    let rocket = crate::rocket_for_backend(backend.clone(), notifier.clone());
                    let rocket_client = rocket::local::asynchronous::Client::tracked(rocket)
                        .await
                        .unwrap();

                    (rocket_client, backend, notifier)
                }

                /// The test itself.
                #item_fn

                let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                    .thread_name("rocket-worker-test-thread")
                    .worker_threads(1)
                    .enable_all()
                    .build()
                    .unwrap();

                runtime.block_on(async {
                    #[allow(unused_variables)]
                    let (rocket_client, backend, notifier) = setup().await;
                    #new_name(#(#test_args),*).await;
                });
            }
        },
        Backend::Mongo => quote! {
            #[test]
            fn #name() {
                /// Test setup.
                async fn setup() -> Option<(
                    rocket::local::asynchronous::Client,
                    crate::store::MongoBackend,
                    crate::notify::RecordingNotifier,
                    mongodb::Database,
                )> {
                    #init_logging

                    let (db_client, db) = crate::test_database().await?;
                    let backend = crate::store::MongoBackend::new(db_client, &db);
                    let notifier = crate::notify::RecordingNotifier::new();
                    let rocket = crate::rocket_for_backend(backend.clone(), notifier.clone());
                    let rocket_client = rocket::local::asynchronous::Client::tracked(rocket)
                        .await
                        .unwrap();

                    Some((rocket_client, backend, notifier, db))
                }

                /// The test itself.
                #item_fn

                /// Test cleanup.
                async fn cleanup(db: mongodb::Database) {
                    db.drop(None).await.unwrap();
                }

                // Create an async runtime. We need a separate one for inside and
                // outside the `catch_unwind`.
                let outer_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                    .thread_name("test-setup-cleanup")
                    .worker_threads(1)
                    .enable_all()
                    .build()
                    .unwrap();
                let inner_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                    .thread_name("rocket-worker-test-thread")
                    .worker_threads(1)
                    .enable_all()
                    .build()
                    .unwrap();

                // Run the setup.
                let (rocket_client, backend, notifier, db) = match outer_runtime.block_on(setup()) {
                    Some(injected) => injected,
                    None => {
                        log::warn!("ROCKET_DB_URI is not set, skipping {}", stringify!(#name));
                        return;
                    }
                };

                // Run the test, catching any panics.
                // Use mutexes to safely transfer `!UnwindSafe` data.
                let injected_mutex =
                    std::sync::Mutex::new((rocket_client, backend, notifier, db.clone()));
                let runtime_mutex = std::sync::Mutex::new(inner_runtime);
                let result = std::panic::catch_unwind(|| {
                    #[allow(unused_variables)]
                    let (rocket_client, backend, notifier, db) = injected_mutex.into_inner().unwrap();
                    let runtime = runtime_mutex.into_inner().unwrap();

                    runtime.block_on(#new_name(#(#test_args),*));
                });

                // Run the cleanup.
                outer_runtime.block_on(cleanup(db));

                // If the test panicked, re-raise the panic.
                if let Err(cause) = result {
                    std::panic::panic_any(cause);
                }
            }
        },
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature, backend: Backend) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut args = vec![];
    let mut seen = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(_) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    // Match on the last segment so qualified paths work too.
                    if let Some(segment) = type_path.path.segments.last() {
                        let injected = match (segment.ident.to_string().as_str(), backend) {
                            ("Client", _) => Some(quote! { rocket_client }),
                            ("RecordingNotifier", _) => Some(quote! { notifier.clone() }),
                            ("MemoryBackend", Backend::Memory) => Some(quote! { backend.clone() }),
                            ("MongoBackend", Backend::Mongo) => Some(quote! { backend.clone() }),
                            ("Database", Backend::Mongo) => Some(quote! { db.clone() }),
                            _ => None,
                        };

                        if let Some(injected) = injected {
                            let type_name = segment.ident.to_string();
                            if seen.contains(&type_name) {
                                return Err(syn::Error::new(
                                    input.span(),
                                    format!("Test cannot accept more than one `{type_name}`"),
                                ));
                            }
                            seen.push(type_name);
                            args.push(injected);
                            continue;
                        }
                    }
                }
            }
        }

        let expected = match backend {
            Backend::Memory => "Expected one of `client_ident: Client`, `backend_ident: MemoryBackend` or `notifier_ident: RecordingNotifier`",
            Backend::Mongo => "Expected one of `client_ident: Client`, `backend_ident: MongoBackend`, `db_ident: Database` or `notifier_ident: RecordingNotifier`",
        };
        return Err(syn::Error::new(input.span(), expected));
    }

    Ok(args)
}
