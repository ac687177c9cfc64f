//! Blueprint cache keys

use std::fmt;

use sha2::{Digest, Sha256};
use weave_bytecode::TypeRef;

use crate::advice::AdviceSpec;
use crate::descriptor::{MethodDescriptor, TargetDescriptor};

const DOMAIN: &[u8] = b"weave-blueprint/2";

/// Structural key of a (target descriptor, advice configuration) pair
///
/// SHA-256 over a length-prefixed encoding of the type identity, every
/// method's shape in slot order, and the ordered `(kind, matcher, order,
/// interceptor id)` tuples. Equal keys mean equal blueprints.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Key for `descriptor` under `advice`
    pub fn compute(descriptor: &TargetDescriptor, advice: &[AdviceSpec]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN);
        let identity = descriptor.identity();
        put_str(&mut hasher, identity.name());
        hasher.update(identity.generation().to_le_bytes());

        put_len(&mut hasher, descriptor.len());
        for method in descriptor.methods() {
            put_method(&mut hasher, method);
        }

        put_len(&mut hasher, advice.len());
        for spec in advice {
            put_str(&mut hasher, spec.kind().name());
            put_str(&mut hasher, &spec.matcher().canonical());
            hasher.update(spec.order().to_le_bytes());
            put_str(&mut hasher, spec.id().as_str());
        }

        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Raw digest
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex digits, for names and logs
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

fn put_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_le_bytes());
}

fn put_str(hasher: &mut Sha256, s: &str) {
    put_len(hasher, s.len());
    hasher.update(s.as_bytes());
}

fn put_method(hasher: &mut Sha256, method: &MethodDescriptor) {
    put_str(hasher, method.name());
    put_len(hasher, method.params().len());
    for param in method.params() {
        put_type(hasher, param);
    }
    put_type(hasher, method.ret());
    hasher.update([u8::from(method.is_overridable())]);
    put_len(hasher, method.declared_failures().len());
    for failure in method.declared_failures() {
        put_str(hasher, failure);
    }
}

// tagged so `Object("Long")` and `Boxed(I64)` stay distinct
fn put_type(hasher: &mut Sha256, ty: &TypeRef) {
    match ty {
        TypeRef::Void => hasher.update([0u8]),
        TypeRef::Primitive(p) => hasher.update([1u8, p.to_u8()]),
        TypeRef::Boxed(p) => hasher.update([2u8, p.to_u8()]),
        TypeRef::Str => hasher.update([3u8]),
        TypeRef::Object(name) => {
            hasher.update([4u8]);
            put_str(hasher, name);
        }
        TypeRef::Any => hasher.update([5u8]),
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_bytecode::Primitive;

    use crate::advice::MethodMatcher;
    use crate::descriptor::TypeIdentity;

    fn log(order: i32) -> AdviceSpec {
        AdviceSpec::before("log", |_| Ok(())).with_order(order)
    }

    fn find() -> MethodDescriptor {
        MethodDescriptor::new("find", vec![TypeRef::I64], TypeRef::object("User"))
    }

    fn repo(identity: impl Into<TypeIdentity>) -> TargetDescriptor {
        TargetDescriptor::builder(identity).method(find()).build()
    }

    #[test]
    fn test_structurally_equal_configs_collide() {
        // different closures, same declared identity
        let a = Fingerprint::compute(&repo("Repo"), &[log(1)]);
        let b = Fingerprint::compute(&repo("Repo"), &[log(1)]);
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
        assert_eq!(a.short().len(), 8);
    }

    #[test]
    fn test_every_component_separates_keys() {
        let id = TypeIdentity::new("Repo");
        let base = Fingerprint::compute(&repo(id.clone()), &[log(1)]);

        assert_ne!(base, Fingerprint::compute(&repo(id.redefined()), &[log(1)]));
        assert_ne!(base, Fingerprint::compute(&repo("Repo2"), &[log(1)]));
        assert_ne!(base, Fingerprint::compute(&repo(id.clone()), &[log(2)]));
        assert_ne!(base, Fingerprint::compute(&repo(id.clone()), &[]));
        assert_ne!(
            base,
            Fingerprint::compute(&repo(id.clone()), &[log(1).matching(MethodMatcher::name("find"))])
        );
        assert_ne!(
            base,
            Fingerprint::compute(&repo(id), &[AdviceSpec::after("log", |_, _| Ok(())).with_order(1)])
        );
    }

    #[test]
    fn test_method_shape_separates_keys() {
        let base = Fingerprint::compute(&repo("Repo"), &[log(1)]);
        let variants = [
            TargetDescriptor::builder("Repo")
                .method(find())
                .method(MethodDescriptor::new("save", vec![TypeRef::object("User")], TypeRef::Void))
                .build(),
            TargetDescriptor::builder("Repo")
                .method(MethodDescriptor::new("find", vec![TypeRef::I32], TypeRef::object("User")))
                .build(),
            TargetDescriptor::builder("Repo")
                .method(MethodDescriptor::new("find", vec![TypeRef::I64], TypeRef::Any))
                .build(),
            TargetDescriptor::builder("Repo").method(find().non_overridable()).build(),
            TargetDescriptor::builder("Repo").method(find().throws("NotFound")).build(),
            TargetDescriptor::builder("Repo")
                .method(MethodDescriptor::new("find", vec![TypeRef::Boxed(Primitive::I64)], TypeRef::object("User")))
                .build(),
            TargetDescriptor::builder("Repo")
                .method(MethodDescriptor::new("find", vec![TypeRef::object("Long")], TypeRef::object("User")))
                .build(),
            TargetDescriptor::builder("Repo").build(),
        ];
        for variant in &variants {
            assert_ne!(base, Fingerprint::compute(variant, &[log(1)]));
        }
    }

    #[test]
    fn test_order_of_declarations_matters() {
        let a = AdviceSpec::before("a", |_| Ok(()));
        let b = AdviceSpec::before("b", |_| Ok(()));
        assert_ne!(
            Fingerprint::compute(&repo("Repo"), &[a.clone(), b.clone()]),
            Fingerprint::compute(&repo("Repo"), &[b, a])
        );
    }
}
