//! 队列族分配
//!
//! 按索引顺序扫描一遍队列族表，为图形、计算、传输和呈现角色各找一个队列族。
//! 计算角色只接受不带图形能力的队列族，传输角色只接受既没有计算也没有图形
//! 能力的队列族，这样不相关的工作负载不会挤在同一个队列上。

use std::collections::BTreeSet;

use ash::vk;

/// 队列族属性
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamily {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
}

impl QueueFamily {
    pub fn new(flags: vk::QueueFlags, queue_count: u32) -> Self {
        Self { flags, queue_count }
    }

    fn has(&self, flags: vk::QueueFlags) -> bool {
        self.flags.contains(flags)
    }
}

impl From<vk::QueueFamilyProperties> for QueueFamily {
    fn from(props: vk::QueueFamilyProperties) -> Self {
        Self::new(props.queue_flags, props.queue_count)
    }
}

/// 队列角色到队列族索引的分配结果
///
/// 图形和呈现总是有值；计算和传输只有在请求时才有值。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyAssignment {
    pub graphics: Option<u32>,
    pub compute: Option<u32>,
    pub transfer: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyAssignment {
    /// 去重后的队列族索引，每个索引创建一个队列
    pub fn unique_families(&self) -> BTreeSet<u32> {
        [self.graphics, self.present, self.compute, self.transfer]
            .into_iter()
            .flatten()
            .collect()
    }

    /// 交换链需要共享的队列族；图形和呈现相同时为空
    pub fn swap_chain_sharing(&self) -> Vec<u32> {
        match (self.graphics, self.present) {
            (Some(g), Some(p)) if g != p => vec![g, p],
            _ => Vec::new(),
        }
    }
}

/// 解析队列族
///
/// `can_present` 是平台相关的呈现能力查询，呈现角色可以与其他角色共用队列族。
/// 图形或呈现未解析，或者请求了计算/传输但未解析时返回 `None`。
pub fn resolve_queues<F>(
    families: &[QueueFamily],
    wants_compute: bool,
    wants_transfer: bool,
    mut can_present: F,
) -> Option<QueueFamilyAssignment>
where
    F: FnMut(u32) -> bool,
{
    let mut graphics = None;
    let mut compute = None;
    let mut transfer = None;
    let mut present = None;

    for (index, family) in families.iter().enumerate() {
        if family.queue_count == 0 {
            continue;
        }
        let index = index as u32;

        if graphics.is_none() && family.has(vk::QueueFlags::GRAPHICS) {
            graphics = Some(index);
        }

        if compute.is_none()
            && family.has(vk::QueueFlags::COMPUTE)
            && !family.has(vk::QueueFlags::GRAPHICS)
        {
            compute = Some(index);
        }

        if transfer.is_none()
            && family.has(vk::QueueFlags::TRANSFER)
            && !family.has(vk::QueueFlags::COMPUTE)
            && !family.has(vk::QueueFlags::GRAPHICS)
        {
            transfer = Some(index);
        }

        if present.is_none() && can_present(index) {
            present = Some(index);
        }
    }

    if graphics.is_none()
        || present.is_none()
        || (wants_compute && compute.is_none())
        || (wants_transfer && transfer.is_none())
    {
        return None;
    }

    Some(QueueFamilyAssignment {
        graphics,
        compute: compute.filter(|_| wants_compute),
        transfer: transfer.filter(|_| wants_transfer),
        present,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL: vk::QueueFlags = vk::QueueFlags::from_raw(
        vk::QueueFlags::GRAPHICS.as_raw() | vk::QueueFlags::COMPUTE.as_raw() | vk::QueueFlags::TRANSFER.as_raw(),
    );

    fn typical_table() -> Vec<QueueFamily> {
        vec![
            QueueFamily::new(ALL, 16),
            QueueFamily::new(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 8),
            QueueFamily::new(vk::QueueFlags::TRANSFER, 2),
        ]
    }

    #[test]
    fn test_transfer_prefers_pure_transfer_family() {
        let families = vec![QueueFamily::new(ALL, 16), QueueFamily::new(vk::QueueFlags::TRANSFER, 1)];
        let assignment = resolve_queues(&families, false, true, |i| i == 0).unwrap();
        assert_eq!(assignment.graphics, Some(0));
        assert_eq!(assignment.transfer, Some(1));
        assert_eq!(assignment.present, Some(0));
        assert_eq!(assignment.compute, None);
    }

    #[test]
    fn test_compute_skips_graphics_families() {
        let assignment = resolve_queues(&typical_table(), true, true, |_| true).unwrap();
        assert_eq!(assignment.compute, Some(1));
        assert_eq!(assignment.transfer, Some(2));
        assert_eq!(assignment.unique_families().into_iter().collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unrequested_roles_stay_unresolved() {
        let assignment = resolve_queues(&typical_table(), false, false, |_| true).unwrap();
        assert_eq!(assignment.compute, None);
        assert_eq!(assignment.transfer, None);
        assert_eq!(assignment.unique_families().len(), 1);
    }

    #[test]
    fn test_requested_but_missing_role_fails() {
        let families = vec![QueueFamily::new(ALL, 4)];
        assert!(resolve_queues(&families, true, false, |_| true).is_none());
        assert!(resolve_queues(&families, false, true, |_| true).is_none());
        assert!(resolve_queues(&families, false, false, |_| true).is_some());
    }

    #[test]
    fn test_present_may_alias_and_may_differ() {
        let assignment = resolve_queues(&typical_table(), false, false, |i| i == 2).unwrap();
        assert_eq!(assignment.present, Some(2));
        assert_eq!(assignment.swap_chain_sharing(), vec![0, 2]);

        let assignment = resolve_queues(&typical_table(), false, false, |i| i == 0).unwrap();
        assert!(assignment.swap_chain_sharing().is_empty());
    }

    #[test]
    fn test_no_present_or_empty_families_fail() {
        assert!(resolve_queues(&typical_table(), false, false, |_| false).is_none());
        let empty = vec![QueueFamily::new(ALL, 0)];
        assert!(resolve_queues(&empty, false, false, |_| true).is_none());
    }


    fn family_table() -> impl Strategy<Value = Vec<QueueFamily>> {
        proptest::collection::vec((0u32..8, 0u32..4), 0..8).prop_map(|rows| {
            rows.into_iter()
                .map(|(bits, count)| QueueFamily::new(vk::QueueFlags::from_raw(bits), count))
                .collect()
        })
    }

    fn first_family(families: &[QueueFamily], pred: impl Fn(u32, &QueueFamily) -> bool) -> Option<u32> {
        families
            .iter()
            .enumerate()
            .find(|(i, f)| f.queue_count > 0 && pred(*i as u32, f))
            .map(|(i, _)| i as u32)
    }

    proptest! {
        #[test]
        fn test_resolution_is_idempotent_for_any_table(
            families in family_table(),
            present_mask in any::<u8>(),
            wants_compute in any::<bool>(),
            wants_transfer in any::<bool>(),
        ) {
            let can_present = |i: u32| present_mask & (1 << i) != 0;
            let first = resolve_queues(&families, wants_compute, wants_transfer, can_present);
            let second = resolve_queues(&families, wants_compute, wants_transfer, can_present);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn test_transfer_role_goes_to_first_pure_transfer_family(
            families in family_table(),
            present_mask in any::<u8>(),
        ) {
            let can_present = |i: u32| present_mask & (1 << i) != 0;
            let graphics = first_family(&families, |_, f| f.has(vk::QueueFlags::GRAPHICS));
            let present = first_family(&families, |i, _| can_present(i));
            let pure_transfer = first_family(&families, |_, f| {
                f.has(vk::QueueFlags::TRANSFER)
                    && !f.has(vk::QueueFlags::COMPUTE)
                    && !f.has(vk::QueueFlags::GRAPHICS)
            });

            let assignment = resolve_queues(&families, false, true, can_present);
            if graphics.is_some() && present.is_some() && pure_transfer.is_some() {
                let assignment = assignment.unwrap();
                prop_assert_eq!(assignment.transfer, pure_transfer);
                prop_assert_eq!(assignment.graphics, graphics);
                prop_assert_eq!(assignment.present, present);
            } else {
                prop_assert!(assignment.is_none());
            }
        }

        #[test]
        fn test_pure_transfer_family_beats_combined_family(
            mut families in family_table(),
            insert_at in any::<proptest::sample::Index>(),
        ) {
            let combined = insert_at.index(families.len() + 1);
            families.insert(combined, QueueFamily::new(ALL, 4));
            families.push(QueueFamily::new(vk::QueueFlags::TRANSFER, 1));

            let assignment = resolve_queues(&families, false, true, |i| i == combined as u32).unwrap();
            let transfer = assignment.transfer.unwrap() as usize;
            prop_assert_ne!(transfer, combined);
            prop_assert!(families[transfer].has(vk::QueueFlags::TRANSFER));
            prop_assert!(!families[transfer].has(vk::QueueFlags::GRAPHICS));
            prop_assert!(!families[transfer].has(vk::QueueFlags::COMPUTE));
        }
    }
}
