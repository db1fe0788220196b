//! Capability contracts and member classification.

use crate::loader::{Origin, Program};
use crate::types::{DeclId, TypeIndex};
use std::collections::HashSet;

/// Package the contracts are declared in.
pub const BASE_PACKAGE: &str = "@plutolang/base";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Capability {
    Resource,
    ClientApi,
    InfraApi,
    CapturedProps,
    FnResource,
}

impl Capability {
    pub fn contract(self) -> &'static str {
        match self {
            Capability::Resource => "IResource",
            Capability::ClientApi => "IResourceClientApi",
            Capability::InfraApi => "IResourceInfraApi",
            Capability::CapturedProps => "IResourceCapturedProps",
            Capability::FnResource => "FnResource",
        }
    }
}

/// Which API a member of a resource type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MemberKind {
    Client,
    Infra,
    Captured,
    /// Declared, but by no capability interface.
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MemberLookup {
    Found {
        decl: DeclId,
        member: usize,
        kind: MemberKind,
    },
    /// Declared by several capability interfaces, named here.
    Ambiguous(Vec<String>),
    Missing,
}

const API_CONTRACTS: [(Capability, MemberKind); 3] = [
    (Capability::ClientApi, MemberKind::Client),
    (Capability::InfraApi, MemberKind::Infra),
    (Capability::CapturedProps, MemberKind::Captured),
];

pub(crate) struct Contracts<'i, 't> {
    program: &'t Program,
    types: &'i TypeIndex<'t>,
}

impl<'i, 't> Contracts<'i, 't> {
    pub fn new(program: &'t Program, types: &'i TypeIndex<'t>) -> Self {
        Self { program, types }
    }

    /// Whether any of `ids` extends the contract declared in the base package.
    ///
    /// A look-alike declared anywhere else does not count.
    pub fn conforms(&self, ids: &[DeclId], capability: Capability) -> bool {
        self.ancestors(ids)
            .into_iter()
            .any(|id| self.is_contract(id, capability))
    }

    /// Find `name` among the members of `ids` and their ancestors.
    pub fn lookup_member(&self, ids: &[DeclId], name: &str) -> MemberLookup {
        let mut plain = None;
        let mut found = Vec::new();
        for id in self.ancestors(ids) {
            let decl = self.types.get(id);
            let Some(member) = decl.members.iter().position(|member| member.name == name) else {
                continue;
            };
            let kinds: Vec<MemberKind> = API_CONTRACTS
                .iter()
                .filter(|(capability, _)| self.conforms(&[id], *capability))
                .map(|(_, kind)| *kind)
                .collect();
            if kinds.is_empty() {
                plain.get_or_insert((id, member));
            }
            for kind in kinds {
                found.push((id, member, kind));
            }
        }

        match found.as_slice() {
            [(decl, member, kind)] => MemberLookup::Found {
                decl: *decl,
                member: *member,
                kind: *kind,
            },
            [] => match plain {
                Some((decl, member)) => MemberLookup::Found {
                    decl,
                    member,
                    kind: MemberKind::Plain,
                },
                None => MemberLookup::Missing,
            },
            _ => {
                let mut names: Vec<String> = found
                    .iter()
                    .map(|(id, _, _)| self.types.get(*id).name.clone())
                    .collect();
                names.dedup();
                MemberLookup::Ambiguous(names)
            }
        }
    }

    fn is_contract(&self, id: DeclId, capability: Capability) -> bool {
        let decl = self.types.get(id);
        decl.name == capability.contract()
            && matches!(
                &self.program.files[decl.module].origin,
                Origin::Library(package) if package == BASE_PACKAGE
            )
    }

    /// `ids` and everything they extend, each once, in discovery order.
    fn ancestors(&self, ids: &[DeclId]) -> Vec<DeclId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut stack: Vec<DeclId> = ids.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            out.push(id);
            stack.extend(self.types.get(id).bases.iter().rev());
        }
        out
    }
}
