//! The group section: `G1(PEPTIDE1:0.5+PEPTIDE2:0.5)"dimer"|G2(G1,CHEM1)`, plus the HELM1 base pairs that can
//! appear alongside group declarations

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use nom_miette::{LabeledParseError, complete_parser};

use crate::{
    BondRatio, GraphEditor, GroupId, GroupInfo, GroupLogic, HelmErrorKind, MonomerStore, PolymerKind,
    annotation::{Detached, detach},
    errors::ParseResult,
};

use super::{
    Builder, Connection, connection_token,
    grammar::{self, MemberToken, Reference, Site},
    splitter::{contains_top_level, matching_close, split_top_level},
};

#[derive(Clone, Debug)]
pub(super) struct GroupToken<'a> {
    pub(super) id: Reference,
    pub(super) token: &'a str,
    pub(super) members: Vec<MemberToken<'a>>,
    pub(super) logic: Option<GroupLogic>,
    pub(super) tag: Option<String>,
}

/// Splits the group section into group declarations and any (HELM1-style) connections mixed in with them
pub(super) fn group_tokens(section: &str) -> ParseResult<'_, (Vec<GroupToken<'_>>, Vec<Connection<'_>>)> {
    let mut groups = Vec::new();
    let mut connections = Vec::new();
    if section.is_empty() {
        return Ok((groups, connections));
    }

    let mut seen = HashSet::new();
    for token in split_top_level(section, '|') {
        let Detached { body, repeat, tag } = detach(token);
        let Ok((rest, id)) = super::run(grammar::group_id(body)) else {
            connections.push(connection_token(token)?);
            continue;
        };
        if !rest.starts_with('(') {
            connections.push(connection_token(token)?);
            continue;
        }

        let is_wrapped = matching_close(rest).is_some_and(|close| close + 1 == rest.len());
        if !is_wrapped || repeat.is_some() {
            return Err(LabeledParseError::spanning(token, HelmErrorKind::ExpectedGroup));
        }
        if !seen.insert(id) {
            return Err(LabeledParseError::spanning(
                &body[..body.len() - rest.len()],
                HelmErrorKind::DuplicateGroup(id.to_string()),
            ));
        }

        let inner = &rest[1..rest.len() - 1];
        let logic = match (contains_top_level(inner, '+'), contains_top_level(inner, ',')) {
            (true, true) => {
                return Err(LabeledParseError::spanning(
                    inner,
                    HelmErrorKind::MixedGroupLogic,
                ));
            }
            (true, false) => Some(GroupLogic::And),
            (false, true) => Some(GroupLogic::Or),
            (false, false) => None,
        };
        let separator = if logic == Some(GroupLogic::And) { '+' } else { ',' };
        let members = split_top_level(inner, separator)
            .into_iter()
            .map(complete_parser(grammar::member))
            .collect::<Result<_, _>>()?;

        groups.push(GroupToken {
            id,
            token,
            members,
            logic,
            tag,
        });
    }
    Ok((groups, connections))
}

/// Finds the two-member, fully-ratioed groups that really describe the ratio of a single connection between their
/// members, like `G3(PEPTIDE1:1+CHEM1:2)` alongside `PEPTIDE1,CHEM1,1:R1-1:R1`. Maps the index of each such
/// connection to the id of the group describing it, and the ratio itself.
pub(super) fn bond_ratios(
    groups: &[GroupToken],
    connections: &[Connection],
) -> HashMap<usize, (Reference, BondRatio)> {
    let referenced: HashSet<_> = connections
        .iter()
        .flat_map(|connection| &connection.ends)
        .map(|end| end.reference)
        .collect();

    let mut ratios = HashMap::new();
    for group in groups {
        let [
            MemberToken {
                reference: first,
                ratio: Some(first_ratio),
                ..
            },
            MemberToken {
                reference: second,
                ratio: Some(second_ratio),
                ..
            },
        ] = group.members[..]
        else {
            continue;
        };
        if referenced.contains(&group.id) {
            continue;
        }

        let joining = connections.iter().position(|connection| {
            let [a, b] = &connection.ends;
            (a.reference, b.reference) == (first, second)
                || (a.reference, b.reference) == (second, first)
        });
        if let Some(index) = joining
            && !ratios.contains_key(&index)
        {
            let ratio = if connections[index].ends[0].reference == first {
                BondRatio {
                    a: first_ratio.to_owned(),
                    b: second_ratio.to_owned(),
                }
            } else {
                BondRatio {
                    a: second_ratio.to_owned(),
                    b: first_ratio.to_owned(),
                }
            };
            ratios.insert(index, (group.id, ratio));
        }
    }
    ratios
}

impl<'a, S: MonomerStore + ?Sized, G: GraphEditor> Builder<'a, '_, S, G> {
    /// Creates every declared group (and any chain wrappers), then fills them with their members
    pub(super) fn build_groups(
        &mut self,
        declarations: &[GroupToken<'a>],
        connections: &[Connection<'a>],
    ) -> ParseResult<'a, ()> {
        let member_ratios: HashMap<Reference, &str> = declarations
            .iter()
            .flat_map(|group| &group.members)
            .filter_map(|member| Some((member.reference, member.ratio?)))
            .collect();

        self.wrap_chains(&member_ratios, connections)?;

        for group in declarations {
            let info = GroupInfo {
                logic: group.logic,
                ratio: member_ratios.get(&group.id).map(|&r| r.to_owned()),
                tag: group.tag.clone(),
            };
            let id = self.editor.create_group(info);
            self.groups.insert(group.id, id);
            self.group_tokens.insert(id, group.token);
        }

        let mut claimed: HashMap<Reference, Reference> = HashMap::new();
        for group in declarations {
            let parent = self.groups[&group.id];
            for member in &group.members {
                if let Some(owner) = claimed.insert(member.reference, group.id) {
                    return Err(LabeledParseError::spanning(
                        member.text,
                        HelmErrorKind::AlreadyGrouped {
                            member: member.reference.to_string(),
                            group: owner.to_string(),
                        },
                    ));
                }
                self.add_member(parent, member)?;
            }
        }

        self.check_group_depth()
    }

    fn add_member(
        &mut self,
        parent: GroupId,
        member: &MemberToken<'a>,
    ) -> ParseResult<'a, ()> {
        let to_error = |kind| LabeledParseError::spanning(member.text, kind);
        let name = member.reference.to_string();

        let child = if member.reference.kind == PolymerKind::Group {
            let child = self.groups.get(&member.reference).copied();
            Some(child.ok_or_else(|| to_error(HelmErrorKind::UndeclaredGroup(name)))?)
        } else {
            let chain = self
                .chains
                .get(&member.reference)
                .ok_or_else(|| to_error(HelmErrorKind::UnknownChain(name.clone())))?;
            if let Some(&wrapper) = self.wrappers.get(&member.reference) {
                Some(wrapper)
            } else {
                for &node in &chain.positions {
                    self.editor.join_group(node, parent).map_err(to_error)?;
                }
                None
            }
        };

        if let Some(child) = child {
            self.editor.nest_group(child, parent).map_err(|kind| match kind {
                HelmErrorKind::CyclicGroup(_) => to_error(HelmErrorKind::CyclicGroup(
                    member.reference.to_string(),
                )),
                kind => to_error(kind),
            })?;
            self.parents.insert(child, parent);
        }
        Ok(())
    }

    /// A chain gets a group of its own when it has an annotation or ratio to carry, or when something connects to it
    /// as a whole (with a `?` position)
    fn wrap_chains(
        &mut self,
        member_ratios: &HashMap<Reference, &str>,
        connections: &[Connection<'a>],
    ) -> ParseResult<'a, ()> {
        let connected_whole: HashSet<Reference> = connections
            .iter()
            .flat_map(|connection| &connection.ends)
            .filter(|end| matches!(end.site, Site::Wildcard(_)))
            .map(|end| end.reference)
            .collect();

        for (&reference, chain) in &self.chains {
            let ratio = member_ratios.get(&reference).map(|&r| r.to_owned());
            let connected = connected_whole.contains(&reference) && !chain.kind.is_single();
            if chain.annotation.is_none() && ratio.is_none() && !connected {
                continue;
            }

            let wrapper = self.editor.create_group(GroupInfo {
                logic: None,
                ratio,
                tag: chain.annotation.clone(),
            });
            for &node in &chain.positions {
                self.editor
                    .join_group(node, wrapper)
                    .map_err(|kind| LabeledParseError::spanning(chain.body, kind))?;
            }
            self.wrappers.insert(reference, wrapper);
        }
        Ok(())
    }

    fn check_group_depth(&self) -> ParseResult<'a, ()> {
        let limit = self.parser.depth_limit;
        for (&group, &token) in &self.group_tokens {
            let mut depth = 1;
            let mut ancestor = self.parents.get(&group);
            while let Some(parent) = ancestor {
                depth += 1;
                if depth > limit {
                    return Err(LabeledParseError::spanning(
                        token,
                        HelmErrorKind::NestingTooDeep(limit),
                    ));
                }
                ancestor = self.parents.get(parent);
            }
        }
        Ok(())
    }
}
