//! Graphics-pipeline create-info aggregation.
//!
//! `vk::GraphicsPipelineCreateInfo` is a web of raw pointers into nine
//! sub-info structs, which themselves point into arrays. The pack owns all
//! of it in one place and re-wires every pointer with [`GraphicsPipelineCreateInfoPack::update`].
//! After moving a pack, `update()` MUST be called before the create info is
//! handed to Vulkan; until then the nested pointers refer to the moved-from
//! location.

use ash::vk;

/// A dependency-free aggregate of every piece of graphics-pipeline state.
///
/// Fill the public vectors and sub-infos, call [`Self::update`], then pass
/// [`Self::create_info`] to pipeline creation.
pub struct GraphicsPipelineCreateInfoPack {
    pub create_info: vk::GraphicsPipelineCreateInfo,

    pub vertex_input_state: vk::PipelineVertexInputStateCreateInfo,
    pub input_assembly_state: vk::PipelineInputAssemblyStateCreateInfo,
    pub tessellation_state: vk::PipelineTessellationStateCreateInfo,
    pub viewport_state: vk::PipelineViewportStateCreateInfo,
    pub rasterization_state: vk::PipelineRasterizationStateCreateInfo,
    pub multisample_state: vk::PipelineMultisampleStateCreateInfo,
    pub depth_stencil_state: vk::PipelineDepthStencilStateCreateInfo,
    pub color_blend_state: vk::PipelineColorBlendStateCreateInfo,
    pub dynamic_state: vk::PipelineDynamicStateCreateInfo,

    pub shader_stages: Vec<vk::PipelineShaderStageCreateInfo>,
    pub vertex_input_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_input_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub viewports: Vec<vk::Viewport>,
    pub scissors: Vec<vk::Rect2D>,
    pub color_blend_attachment_states: Vec<vk::PipelineColorBlendAttachmentState>,
    pub dynamic_states: Vec<vk::DynamicState>,

    /// Viewport count reported when `viewports` is empty (dynamic viewport).
    pub dynamic_viewport_count: u32,
    /// Scissor count reported when `scissors` is empty (dynamic scissor).
    pub dynamic_scissor_count: u32,
}

impl Default for GraphicsPipelineCreateInfoPack {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsPipelineCreateInfoPack {
    pub fn new() -> Self {
        let mut pack = GraphicsPipelineCreateInfoPack {
            create_info: vk::GraphicsPipelineCreateInfo::default(),
            vertex_input_state: vk::PipelineVertexInputStateCreateInfo::default(),
            input_assembly_state: vk::PipelineInputAssemblyStateCreateInfo::default(),
            tessellation_state: vk::PipelineTessellationStateCreateInfo::default(),
            viewport_state: vk::PipelineViewportStateCreateInfo::default(),
            rasterization_state: vk::PipelineRasterizationStateCreateInfo::default(),
            multisample_state: vk::PipelineMultisampleStateCreateInfo::default(),
            depth_stencil_state: vk::PipelineDepthStencilStateCreateInfo::default(),
            color_blend_state: vk::PipelineColorBlendStateCreateInfo::default(),
            dynamic_state: vk::PipelineDynamicStateCreateInfo::default(),
            shader_stages: Vec::new(),
            vertex_input_bindings: Vec::new(),
            vertex_input_attributes: Vec::new(),
            viewports: Vec::new(),
            scissors: Vec::new(),
            color_blend_attachment_states: Vec::new(),
            dynamic_states: Vec::new(),
            dynamic_viewport_count: 1,
            dynamic_scissor_count: 1,
        };
        pack.create_info.base_pipeline_index = -1;
        pack.link_sub_infos();
        pack
    }

    /// Re-wires every nested pointer to its owning vector and refreshes the
    /// viewport/scissor counts (vector length, or the dynamic fallback when
    /// the vector is empty). Call after filling the pack and after every
    /// move.
    pub fn update(&mut self) {
        self.viewport_state.viewport_count = if self.viewports.is_empty() {
            self.dynamic_viewport_count
        } else {
            self.viewports.len() as u32
        };
        self.viewport_state.scissor_count = if self.scissors.is_empty() {
            self.dynamic_scissor_count
        } else {
            self.scissors.len() as u32
        };

        self.update_array_pointers();
    }

    fn link_sub_infos(&mut self) {
        self.create_info.p_vertex_input_state = &self.vertex_input_state;
        self.create_info.p_input_assembly_state = &self.input_assembly_state;
        self.create_info.p_tessellation_state = &self.tessellation_state;
        self.create_info.p_viewport_state = &self.viewport_state;
        self.create_info.p_rasterization_state = &self.rasterization_state;
        self.create_info.p_multisample_state = &self.multisample_state;
        self.create_info.p_depth_stencil_state = &self.depth_stencil_state;
        self.create_info.p_color_blend_state = &self.color_blend_state;
        self.create_info.p_dynamic_state = &self.dynamic_state;
    }

    fn update_array_pointers(&mut self) {
        self.viewport_state.p_viewports = if self.viewports.is_empty() {
            std::ptr::null()
        } else {
            self.viewports.as_ptr()
        };
        self.viewport_state.p_scissors = if self.scissors.is_empty() {
            std::ptr::null()
        } else {
            self.scissors.as_ptr()
        };

        self.create_info.stage_count = self.shader_stages.len() as u32;
        self.create_info.p_stages = self.shader_stages.as_ptr();

        self.vertex_input_state.vertex_binding_description_count =
            self.vertex_input_bindings.len() as u32;
        self.vertex_input_state.p_vertex_binding_descriptions = self.vertex_input_bindings.as_ptr();
        self.vertex_input_state.vertex_attribute_description_count =
            self.vertex_input_attributes.len() as u32;
        self.vertex_input_state.p_vertex_attribute_descriptions =
            self.vertex_input_attributes.as_ptr();

        self.color_blend_state.attachment_count = self.color_blend_attachment_states.len() as u32;
        self.color_blend_state.p_attachments = self.color_blend_attachment_states.as_ptr();

        self.dynamic_state.dynamic_state_count = self.dynamic_states.len() as u32;
        self.dynamic_state.p_dynamic_states = self.dynamic_states.as_ptr();

        self.link_sub_infos();
    }

    /// The assembled create info. Valid only while the pack is neither
    /// moved nor mutated, and only after [`Self::update`].
    pub fn create_info(&self) -> &vk::GraphicsPipelineCreateInfo {
        &self.create_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_links_sub_infos_to_self() {
        let mut pack = GraphicsPipelineCreateInfoPack::new();
        pack.update();
        assert_eq!(
            pack.create_info.p_viewport_state,
            &pack.viewport_state as *const _
        );
        assert_eq!(
            pack.create_info.p_color_blend_state,
            &pack.color_blend_state as *const _
        );
        assert_eq!(pack.create_info.base_pipeline_index, -1);
    }

    #[test]
    fn empty_viewports_report_dynamic_counts() {
        let mut pack = GraphicsPipelineCreateInfoPack::new();
        pack.dynamic_viewport_count = 2;
        pack.dynamic_scissor_count = 3;
        pack.update();
        assert_eq!(pack.viewport_state.viewport_count, 2);
        assert_eq!(pack.viewport_state.scissor_count, 3);
        assert!(pack.viewport_state.p_viewports.is_null());
    }

    #[test]
    fn filled_vectors_override_dynamic_counts() {
        let mut pack = GraphicsPipelineCreateInfoPack::new();
        pack.viewports.push(vk::Viewport::default());
        pack.scissors.push(vk::Rect2D::default());
        pack.scissors.push(vk::Rect2D::default());
        pack.update();
        assert_eq!(pack.viewport_state.viewport_count, 1);
        assert_eq!(pack.viewport_state.scissor_count, 2);
        assert_eq!(pack.viewport_state.p_viewports, pack.viewports.as_ptr());
    }

    #[test]
    fn update_after_move_repairs_pointers() {
        let mut pack = GraphicsPipelineCreateInfoPack::new();
        pack.shader_stages.push(vk::PipelineShaderStageCreateInfo::default());
        pack.update();

        let mut moved = pack;
        moved.update();
        assert_eq!(moved.create_info.p_stages, moved.shader_stages.as_ptr());
        assert_eq!(
            moved.create_info.p_vertex_input_state,
            &moved.vertex_input_state as *const _
        );
        assert_eq!(moved.create_info.stage_count, 1);
    }
}
